use super::Session;
use crate::error::Result;
use crate::ids::ResidentId;
use crate::resident::Resident;

impl Session {
    pub async fn add_residents(&mut self, input: &str) -> Result<Vec<Resident>> {
        self.require_admin()?;
        self.roster.add_from_input(input).await
    }

    /// Rename a resident. Open to everyone, like the roster listing.
    pub async fn edit_resident(
        &mut self,
        id: ResidentId,
        first_name: &str,
        last_name: &str,
    ) -> Result<()> {
        self.roster.edit(id, first_name, last_name).await
    }

    pub async fn delete_resident(&mut self, id: ResidentId) -> Result<Resident> {
        self.require_admin()?;
        self.roster.remove(id).await
    }
}
