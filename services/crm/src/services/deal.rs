//! Deal access

use super::{EntityService, ManagedEntity};
use crate::models::{Deal, DealPatch, NewDeal};

pub type DealService = EntityService<Deal>;

impl ManagedEntity for Deal {
    fn validate_new(new: &NewDeal) -> Result<(), String> {
        new.validate()
    }

    fn validate_patch(patch: &DealPatch) -> Result<(), String> {
        patch.validate()
    }
}
