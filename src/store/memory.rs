use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::RecordStore;
use crate::error::Result;
use crate::server::validation::user_tag;
use crate::types::*;

/// In-process record store. Backs local development and the test suite,
/// and is the default backend when no remote credentials are configured.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, User>>,
    schedules: Mutex<HashMap<String, Schedule>>,
    shops: Mutex<HashMap<String, Shop>>,
    profiles: Mutex<HashMap<String, Profile>>,
    hotels: Mutex<HashMap<String, Hotel>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(username).cloned())
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        self.users
            .lock()
            .unwrap()
            .insert(user.username.clone(), user.clone());
        Ok(user.clone())
    }

    async fn touch_last_login(&self, username: &str) -> Result<()> {
        if let Some(user) = self.users.lock().unwrap().get_mut(username) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_schedules(
        &self,
        username: Option<&str>,
        date: Option<&str>,
    ) -> Result<Vec<Schedule>> {
        let schedules = self.schedules.lock().unwrap();
        let mut out: Vec<Schedule> = schedules
            .values()
            .filter(|s| match username {
                Some(username) => {
                    s.username == username || s.notes.contains(&user_tag(username))
                }
                None => true,
            })
            .filter(|s| date.is_none_or(|date| s.work_date == date))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.work_date
                .cmp(&b.work_date)
                .then_with(|| a.start_time.cmp(&b.start_time))
        });
        Ok(out)
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<Schedule> {
        let mut schedule = schedule.clone();
        schedule.created_at = Some(Utc::now());
        self.schedules
            .lock()
            .unwrap()
            .insert(schedule.id.clone(), schedule.clone());
        Ok(schedule)
    }

    async fn update_schedule(
        &self,
        id: &str,
        patch: &SchedulePatch,
    ) -> Result<Option<Schedule>> {
        let mut schedules = self.schedules.lock().unwrap();
        let Some(schedule) = schedules.get_mut(id) else {
            return Ok(None);
        };
        if let Some(username) = &patch.username {
            schedule.username = username.clone();
        }
        if let Some(stores) = &patch.work_store {
            schedule.work_store = stores.clone();
        }
        if let Some(date) = &patch.work_date {
            schedule.work_date = date.clone();
        }
        if let Some(start) = &patch.start_time {
            schedule.start_time = start.clone();
        }
        if let Some(end) = &patch.end_time {
            schedule.end_time = end.clone();
        }
        if let Some(duration) = patch.duration {
            schedule.duration = duration;
        }
        if let Some(notes) = &patch.notes {
            schedule.notes = notes.clone();
        }
        schedule.updated_at = Some(Utc::now());
        Ok(Some(schedule.clone()))
    }

    async fn delete_schedule(&self, id: &str) -> Result<bool> {
        Ok(self.schedules.lock().unwrap().remove(id).is_some())
    }

    async fn list_shops(&self) -> Result<Vec<Shop>> {
        let mut shops: Vec<Shop> = self.shops.lock().unwrap().values().cloned().collect();
        shops.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(shops)
    }

    async fn get_shop(&self, id: &str) -> Result<Option<Shop>> {
        Ok(self.shops.lock().unwrap().get(id).cloned())
    }

    async fn create_shop(&self, shop: &Shop) -> Result<Shop> {
        let mut shop = shop.clone();
        shop.created_at = Some(Utc::now());
        self.shops
            .lock()
            .unwrap()
            .insert(shop.id.clone(), shop.clone());
        Ok(shop)
    }

    async fn update_shop(&self, id: &str, patch: &ShopPatch) -> Result<Option<Shop>> {
        let mut shops = self.shops.lock().unwrap();
        let Some(shop) = shops.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            shop.name = name.clone();
        }
        if let Some(address) = &patch.address {
            shop.address = address.clone();
        }
        if let Some(contact) = &patch.contact {
            shop.contact = contact.clone();
        }
        if let Some(phone) = &patch.phone {
            shop.phone = phone.clone();
        }
        if let Some(notes) = &patch.notes {
            shop.notes = notes.clone();
        }
        shop.updated_at = Some(Utc::now());
        Ok(Some(shop.clone()))
    }

    async fn delete_shop(&self, id: &str) -> Result<bool> {
        Ok(self.shops.lock().unwrap().remove(id).is_some())
    }

    async fn get_profile(&self, username: &str) -> Result<Option<Profile>> {
        Ok(self.profiles.lock().unwrap().get(username).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile> {
        let mut profiles = self.profiles.lock().unwrap();
        let mut saved = profile.clone();
        match profiles.get(&profile.username) {
            Some(existing) => saved.created_at = existing.created_at,
            None => saved.created_at = Some(Utc::now()),
        }
        saved.updated_at = Some(Utc::now());
        profiles.insert(saved.username.clone(), saved.clone());
        Ok(saved)
    }

    async fn get_hotel(&self, username: &str) -> Result<Option<Hotel>> {
        Ok(self.hotels.lock().unwrap().get(username).cloned())
    }

    async fn upsert_hotel(&self, hotel: &Hotel) -> Result<Hotel> {
        let mut hotels = self.hotels.lock().unwrap();
        let mut saved = hotel.clone();
        match hotels.get(&hotel.username) {
            Some(existing) => saved.created_at = existing.created_at,
            None => saved.created_at = Some(Utc::now()),
        }
        saved.updated_at = Some(Utc::now());
        hotels.insert(saved.username.clone(), saved.clone());
        Ok(saved)
    }

    async fn ping(&self, table: Table) -> TableHealth {
        let total = match table {
            Table::Users => self.users.lock().unwrap().len(),
            Table::Schedules => self.schedules.lock().unwrap().len(),
            Table::Shops => self.shops.lock().unwrap().len(),
        };
        TableHealth {
            ok: true,
            total: Some(total as u64),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(id: &str, username: &str, date: &str, notes: &str) -> Schedule {
        Schedule {
            id: id.into(),
            username: username.into(),
            work_store: vec!["Store A".into()],
            work_date: date.into(),
            start_time: "09:00".into(),
            end_time: "17:00".into(),
            duration: 8.0,
            notes: notes.into(),
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn schedules_filter_by_owner_or_notes_tag() {
        let store = MemoryStore::new();
        store
            .create_schedule(&schedule("s1", "alice", "2025-03-01", ""))
            .await
            .unwrap();
        store
            .create_schedule(&schedule("s2", "bob", "2025-03-01", "covering [@user:alice]"))
            .await
            .unwrap();
        store
            .create_schedule(&schedule("s3", "bob", "2025-03-02", ""))
            .await
            .unwrap();

        let mine = store.list_schedules(Some("alice"), None).await.unwrap();
        assert_eq!(mine.len(), 2);

        let dated = store
            .list_schedules(Some("alice"), Some("2025-03-02"))
            .await
            .unwrap();
        assert!(dated.is_empty());
    }

    #[tokio::test]
    async fn patch_leaves_absent_fields_alone() {
        let store = MemoryStore::new();
        store
            .create_schedule(&schedule("s1", "alice", "2025-03-01", "keep"))
            .await
            .unwrap();
        let patch = SchedulePatch {
            end_time: Some("18:00".into()),
            duration: Some(9.0),
            ..Default::default()
        };
        let updated = store.update_schedule("s1", &patch).await.unwrap().unwrap();
        assert_eq!(updated.end_time, "18:00");
        assert_eq!(updated.notes, "keep");
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn upsert_profile_keeps_original_creation_time() {
        let store = MemoryStore::new();
        let profile = Profile {
            username: "alice".into(),
            real_name: "Alice".into(),
            phone: String::new(),
            id_card: String::new(),
            emergency_contact: String::new(),
            emergency_phone: String::new(),
            address: String::new(),
            created_at: None,
            updated_at: None,
        };
        let first = store.upsert_profile(&profile).await.unwrap();
        let second = store.upsert_profile(&profile).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
    }
}
