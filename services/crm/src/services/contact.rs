//! Contact access

use super::{EntityService, ManagedEntity};
use crate::models::{Contact, ContactPatch, NewContact};

pub type ContactService = EntityService<Contact>;

impl ManagedEntity for Contact {
    fn validate_new(new: &NewContact) -> Result<(), String> {
        new.validate()
    }

    fn validate_patch(patch: &ContactPatch) -> Result<(), String> {
        patch.validate()
    }
}
