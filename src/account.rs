//! The current user's own profile.

use crate::backend::DataService;
use crate::catalog::is_phone_number;
use crate::common::{Profile, ProfileUpdate};
use crate::error::{FieldError, MarketError, Result};

impl ProfileUpdate {
    /// Check the edit form, reporting every bad field at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                errors.push(FieldError::new("name", "Name is required"));
            }
        }
        if let Some(phone) = &self.phone {
            if !phone.trim().is_empty() && !is_phone_number(phone) {
                errors.push(FieldError::new(
                    "phone",
                    "Please enter a valid 10-digit phone number",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MarketError::InvalidProfile(errors))
        }
    }
}

pub async fn current_profile<B: DataService + ?Sized>(backend: &B) -> Result<Profile> {
    let user = backend.current_user().ok_or(MarketError::NotAuthenticated)?;
    backend
        .fetch_profile(&user)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("user {user}")))
}

/// Validate and apply an edit to the current user's profile. An empty edit
/// only reads the profile back.
pub async fn update_profile<B: DataService + ?Sized>(
    backend: &B,
    update: ProfileUpdate,
) -> Result<Profile> {
    let user = backend.current_user().ok_or(MarketError::NotAuthenticated)?;
    update.validate()?;
    if update.is_empty() {
        return current_profile(backend).await;
    }
    backend.update_profile(&user, update).await
}
