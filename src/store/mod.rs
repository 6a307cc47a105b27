pub mod fields;
mod memory;
mod supabase;
mod vika;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;
pub use vika::{VikaSheets, VikaStore};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::*;

/// RecordStore defines the remote record-store interface. One concrete
/// adapter per backend generation; handlers never see which one is active.
///
/// Record ids are assigned by the backing store; `create_*` takes the entity
/// with an empty id and returns the stored representation.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // User operations
    async fn find_user(&self, username: &str) -> Result<Option<User>>;
    async fn create_user(&self, user: &User) -> Result<User>;
    async fn touch_last_login(&self, username: &str) -> Result<()>;

    // Schedule operations
    async fn list_schedules(
        &self,
        username: Option<&str>,
        date: Option<&str>,
    ) -> Result<Vec<Schedule>>;
    async fn create_schedule(&self, schedule: &Schedule) -> Result<Schedule>;
    async fn update_schedule(&self, id: &str, patch: &SchedulePatch)
    -> Result<Option<Schedule>>;
    async fn delete_schedule(&self, id: &str) -> Result<bool>;

    // Shop operations
    async fn list_shops(&self) -> Result<Vec<Shop>>;
    async fn get_shop(&self, id: &str) -> Result<Option<Shop>>;
    async fn create_shop(&self, shop: &Shop) -> Result<Shop>;
    async fn update_shop(&self, id: &str, patch: &ShopPatch) -> Result<Option<Shop>>;
    async fn delete_shop(&self, id: &str) -> Result<bool>;

    // 1:1 metadata, keyed by username
    async fn get_profile(&self, username: &str) -> Result<Option<Profile>>;
    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile>;
    async fn get_hotel(&self, username: &str) -> Result<Option<Hotel>>;
    async fn upsert_hotel(&self, hotel: &Hotel) -> Result<Hotel>;

    // Connectivity diagnostic; failures fold into the report.
    async fn ping(&self, table: Table) -> TableHealth;
}

/// Removes `shop` from a work_store membership list. `None` means the list
/// became empty and the owning schedule should be deleted outright.
#[must_use]
pub fn remove_shop_membership(stores: &[String], shop: &str) -> Option<Vec<String>> {
    if !stores.iter().any(|s| s == shop) {
        return Some(stores.to_vec());
    }
    let remaining: Vec<String> = stores.iter().filter(|s| *s != shop).cloned().collect();
    if remaining.is_empty() { None } else { Some(remaining) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn removing_sole_shop_empties_the_list() {
        assert_eq!(remove_shop_membership(&stores(&["branch1"]), "branch1"), None);
    }

    #[test]
    fn removing_one_of_many_keeps_the_rest() {
        assert_eq!(
            remove_shop_membership(&stores(&["main", "branch1"]), "branch1"),
            Some(stores(&["main"]))
        );
    }

    #[test]
    fn unrelated_lists_are_untouched() {
        assert_eq!(
            remove_shop_membership(&stores(&["main"]), "branch1"),
            Some(stores(&["main"]))
        );
    }
}
