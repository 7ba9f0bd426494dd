//! Resident roster: the named people who attend meetings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::MeetingApi;
use crate::error::{Error, Result};
use crate::ids::ResidentId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resident {
    pub id: ResidentId,
    pub first_name: String,
    pub last_name: String,
}

impl Resident {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn sort_key(&self) -> (String, String) {
        (self.last_name.to_lowercase(), self.first_name.to_lowercase())
    }
}

/// Split `"First Last, First Last"` into (first, last) pairs. The first word
/// is the first name, the rest the last name. Entries with a single word are
/// skipped.
fn parse_names(input: &str) -> Vec<(String, String)> {
    input
        .split(',')
        .filter_map(|entry| {
            let mut words = entry.split_whitespace();
            let first = words.next()?;
            let last: Vec<&str> = words.collect();
            if last.is_empty() {
                return None;
            }
            Some((first.to_string(), last.join(" ")))
        })
        .collect()
}

pub struct Roster {
    residents: Vec<Resident>,
    api: Arc<dyn MeetingApi>,
}

impl Roster {
    pub fn new(api: Arc<dyn MeetingApi>) -> Self {
        Self {
            residents: Vec::new(),
            api,
        }
    }

    /// Fetch the roster. An unreachable backend leaves it empty.
    pub async fn load(&mut self) {
        self.residents = match self.api.list_residents().await {
            Ok(residents) => residents,
            Err(e) => {
                tracing::warn!("Could not load residents: {}", e);
                Vec::new()
            }
        };
    }

    pub fn residents(&self) -> &[Resident] {
        &self.residents
    }

    /// Residents sorted by last name, then first name.
    pub fn sorted(&self) -> Vec<&Resident> {
        let mut sorted: Vec<&Resident> = self.residents.iter().collect();
        sorted.sort_by_key(|r| r.sort_key());
        sorted
    }

    pub fn display_names(&self) -> Vec<String> {
        self.sorted().into_iter().map(Resident::display_name).collect()
    }

    fn next_id(&self) -> u64 {
        self.residents.iter().map(|r| r.id.0).max().unwrap_or(0) + 1
    }

    /// Add every well-formed entry of a comma-separated name list and save.
    pub async fn add_from_input(&mut self, input: &str) -> Result<Vec<Resident>> {
        let names = parse_names(input);
        if names.is_empty() {
            return Err(Error::Validation(
                "Expected a list like: First Last, First Last".to_string(),
            ));
        }

        let first_id = self.next_id();
        let added: Vec<Resident> = names
            .into_iter()
            .enumerate()
            .map(|(i, (first_name, last_name))| Resident {
                id: ResidentId(first_id + i as u64),
                first_name,
                last_name,
            })
            .collect();

        self.residents.extend(added.iter().cloned());
        self.save().await?;
        Ok(added)
    }

    pub async fn edit(&mut self, id: ResidentId, first_name: &str, last_name: &str) -> Result<()> {
        let (first_name, last_name) = (first_name.trim(), last_name.trim());
        if first_name.is_empty() || last_name.is_empty() {
            return Err(Error::Validation(
                "First and last name are both required".to_string(),
            ));
        }
        let resident = self
            .residents
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("resident {}", id)))?;
        resident.first_name = first_name.to_string();
        resident.last_name = last_name.to_string();
        self.save().await
    }

    pub async fn remove(&mut self, id: ResidentId) -> Result<Resident> {
        let index = self
            .residents
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("resident {}", id)))?;
        let removed = self.residents.remove(index);
        self.save().await?;
        Ok(removed)
    }

    async fn save(&self) -> Result<()> {
        self.api.save_residents(&self.residents).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;

    fn roster() -> (Roster, Arc<FakeApi>) {
        let api = Arc::new(FakeApi::new());
        (Roster::new(api.clone()), api)
    }

    #[test]
    fn test_parse_names() {
        let names = parse_names(" Jean Dupont ,Marie  de la Tour, Cher, ,Paul Martin");
        assert_eq!(
            names,
            vec![
                ("Jean".to_string(), "Dupont".to_string()),
                ("Marie".to_string(), "de la Tour".to_string()),
                ("Paul".to_string(), "Martin".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_add_assigns_consecutive_ids() {
        let (mut r, api) = roster();
        r.add_from_input("Jean Dupont, Marie Curie").await.unwrap();
        let added = r.add_from_input("Paul Martin").await.unwrap();
        assert_eq!(added[0].id, ResidentId(3));
        assert_eq!(api.residents().len(), 3);
    }

    #[tokio::test]
    async fn test_add_rejects_input_without_full_names() {
        let (mut r, api) = roster();
        let err = r.add_from_input("Cher, Madonna").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(api.calls("save_residents"), 0);
    }

    #[tokio::test]
    async fn test_display_names_sorted_by_last_name() {
        let (mut r, _) = roster();
        r.add_from_input("Marie Curie, Jean Dupont, Albert camus")
            .await
            .unwrap();
        assert_eq!(
            r.display_names(),
            vec!["Albert camus", "Marie Curie", "Jean Dupont"]
        );
    }

    #[tokio::test]
    async fn test_edit_and_remove() {
        let (mut r, api) = roster();
        r.add_from_input("Jean Dupont").await.unwrap();
        r.edit(ResidentId(1), " Jeanne ", "Dupond").await.unwrap();
        assert_eq!(api.residents()[0].display_name(), "Jeanne Dupond");

        assert!(matches!(
            r.edit(ResidentId(9), "A", "B").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            r.edit(ResidentId(1), "", "B").await,
            Err(Error::Validation(_))
        ));

        r.remove(ResidentId(1)).await.unwrap();
        assert!(r.residents().is_empty());
        assert!(api.residents().is_empty());
    }

    #[tokio::test]
    async fn test_load_offline_is_empty() {
        let (mut r, api) = roster();
        r.add_from_input("Jean Dupont").await.unwrap();
        api.set_online(false);
        r.load().await;
        assert!(r.residents().is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_is_surfaced() {
        let (mut r, api) = roster();
        api.set_online(false);
        let err = r.add_from_input("Jean Dupont").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[test]
    fn test_numeric_string_ids_from_backend() {
        let json = r#"[{"id": "4", "firstName": "A", "lastName": "B"}, {"id": 5, "firstName": "C", "lastName": "D"}]"#;
        let residents: Vec<Resident> = serde_json::from_str(json).unwrap();
        assert_eq!(residents[0].id, ResidentId(4));
        assert_eq!(residents[1].id, ResidentId(5));
    }
}
