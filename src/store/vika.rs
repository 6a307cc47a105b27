use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{Map, Value, json};

use super::fields::{
    FieldSchema, schedule_from_record, schedule_patch_to_fields, schedule_to_fields,
};
use super::RecordStore;
use crate::error::{Error, Result};
use crate::remote::{RemoteClient, RemoteError};
use crate::types::*;

/// Datasheet ids for each entity table. Deployments that never split the
/// sheets point everything at the user sheet.
#[derive(Debug, Clone)]
pub struct VikaSheets {
    pub users: String,
    pub schedules: String,
    pub profiles: String,
    pub hotels: String,
    pub shops: String,
}

/// Record-store adapter for the hosted datasheet API. Reads fetch whole
/// sheets (cached + deduplicated) and filter locally; the remote formula
/// language broke too often across schema generations to trust server-side
/// filters for anything but single-row lookups.
pub struct VikaStore {
    client: RemoteClient,
    schema: FieldSchema,
    sheets: VikaSheets,
}

impl VikaStore {
    pub fn new(client: RemoteClient, schema: FieldSchema, sheets: VikaSheets) -> Self {
        Self {
            client,
            schema,
            sheets,
        }
    }

    fn records_path(&self, sheet: &str) -> String {
        format!("/datasheets/{sheet}/records")
    }

    /// Single-row lookup by an exact field match.
    async fn find_record(
        &self,
        sheet: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<(String, Map<String, Value>)>> {
        let raw = format!("{{{field}}} = \"{value}\"");
        let formula = urlencoding::encode(&raw);
        let endpoint = format!(
            "{}?fieldKey=name&filterByFormula={formula}&maxRecords=1",
            self.records_path(sheet)
        );
        let body = self.client.call(Method::GET, &endpoint, None).await?;
        Ok(first_record(&body))
    }

    async fn create_record(&self, sheet: &str, record_fields: Value) -> Result<(String, Map<String, Value>)> {
        let payload = json!({
            "records": [{ "fields": record_fields }],
            "fieldKey": "name"
        });
        let body = self
            .client
            .call(Method::POST, &self.records_path(sheet), Some(&payload))
            .await?;
        self.client.invalidate_reads(&self.records_path(sheet));
        first_record(&body)
            .ok_or_else(|| Error::Config("datasheet create returned no record".into()))
    }

    async fn patch_record(
        &self,
        sheet: &str,
        record_id: &str,
        record_fields: Value,
    ) -> Result<Option<(String, Map<String, Value>)>> {
        let payload = json!({
            "records": [{ "recordId": record_id, "fields": record_fields }],
            "fieldKey": "name"
        });
        let result = self
            .client
            .call(Method::PATCH, &self.records_path(sheet), Some(&payload))
            .await;
        self.client.invalidate_reads(&self.records_path(sheet));
        match result {
            Ok(body) => Ok(first_record(&body)),
            Err(e) if is_rejection(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_record(&self, sheet: &str, record_id: &str) -> Result<bool> {
        let endpoint = format!(
            "{}?recordIds={}",
            self.records_path(sheet),
            urlencoding::encode(record_id)
        );
        let result = self.client.call(Method::DELETE, &endpoint, None).await;
        self.client.invalidate_reads(&self.records_path(sheet));
        match result {
            Ok(_) => Ok(true),
            Err(e) if is_rejection(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_records(&self, sheet: &str) -> Result<Vec<(String, Map<String, Value>)>> {
        let endpoint = format!("{}?fieldKey=name", self.records_path(sheet));
        let body = self.client.get_cached(&endpoint).await?;
        Ok(all_records(&body))
    }

    async fn shop_record(&self, id: &str) -> Result<Option<(String, Map<String, Value>)>> {
        let endpoint = format!(
            "{}?recordIds={}&fieldKey=name",
            self.records_path(&self.sheets.shops),
            urlencoding::encode(id)
        );
        match self.client.call(Method::GET, &endpoint, None).await {
            Ok(body) => Ok(first_record(&body)),
            Err(e) if is_rejection(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// The datasheet API answers `{code, success, message, data: {records, total}}`.
fn all_records(body: &Value) -> Vec<(String, Map<String, Value>)> {
    body["data"]["records"]
        .as_array()
        .map(|records| {
            records
                .iter()
                .filter_map(|record| {
                    let id = record["recordId"].as_str()?.to_string();
                    let fields = record["fields"].as_object().cloned().unwrap_or_default();
                    Some((id, fields))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn first_record(body: &Value) -> Option<(String, Map<String, Value>)> {
    all_records(body).into_iter().next()
}

/// A definitive client-error answer from the store; retry cannot help and
/// for targeted operations it means the record is simply absent.
fn is_rejection(e: &RemoteError) -> bool {
    matches!(e.status, Some(status) if (400..500).contains(&status) && status != 429)
}

fn str_field(fields: &Map<String, Value>, key: &str) -> String {
    fields.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn time_field(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn user_from_record(id: &str, fields: &Map<String, Value>) -> User {
    User {
        id: id.to_string(),
        username: str_field(fields, "username"),
        email: str_field(fields, "email"),
        phone: fields.get("phone").and_then(Value::as_str).map(str::to_string),
        password_hash: str_field(fields, "password"),
        created_at: time_field(fields, "created_at").unwrap_or_else(Utc::now),
        last_login: time_field(fields, "last_login"),
    }
}

fn shop_from_record(id: &str, fields: &Map<String, Value>) -> Shop {
    Shop {
        id: id.to_string(),
        name: str_field(fields, "name"),
        address: str_field(fields, "address"),
        contact: str_field(fields, "contact"),
        phone: str_field(fields, "phone"),
        notes: str_field(fields, "notes"),
        created_by: str_field(fields, "created_by"),
        created_at: time_field(fields, "created_at"),
        updated_at: time_field(fields, "updated_at"),
    }
}

fn profile_from_record(fields: &Map<String, Value>) -> Profile {
    Profile {
        username: str_field(fields, "username"),
        real_name: str_field(fields, "realName"),
        phone: str_field(fields, "phone"),
        id_card: str_field(fields, "idCard"),
        emergency_contact: str_field(fields, "emergencyContact"),
        emergency_phone: str_field(fields, "emergencyPhone"),
        address: str_field(fields, "address"),
        created_at: time_field(fields, "createdAt"),
        updated_at: time_field(fields, "updatedAt"),
    }
}

fn profile_to_fields(profile: &Profile) -> Value {
    json!({
        "username": profile.username,
        "realName": profile.real_name,
        "phone": profile.phone,
        "idCard": profile.id_card,
        "emergencyContact": profile.emergency_contact,
        "emergencyPhone": profile.emergency_phone,
        "address": profile.address,
        "updatedAt": Utc::now().to_rfc3339(),
    })
}

fn hotel_from_record(fields: &Map<String, Value>) -> Hotel {
    let website_name = match str_field(fields, "websiteName") {
        name if name.is_empty() => DEFAULT_WEBSITE_NAME.to_string(),
        name => name,
    };
    Hotel {
        username: str_field(fields, "username"),
        website_name,
        created_at: time_field(fields, "createdAt"),
        updated_at: time_field(fields, "updatedAt"),
    }
}

#[async_trait]
impl RecordStore for VikaStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        let record = self
            .find_record(&self.sheets.users, "username", username)
            .await?;
        Ok(record.map(|(id, fields)| user_from_record(&id, &fields)))
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        let record_fields = json!({
            "username": user.username,
            "email": user.email,
            "phone": user.phone,
            "password": user.password_hash,
            "created_at": user.created_at.to_rfc3339(),
        });
        let (id, fields) = self.create_record(&self.sheets.users, record_fields).await?;
        Ok(user_from_record(&id, &fields))
    }

    async fn touch_last_login(&self, username: &str) -> Result<()> {
        let Some((record_id, _)) = self
            .find_record(&self.sheets.users, "username", username)
            .await?
        else {
            return Ok(());
        };
        self.patch_record(
            &self.sheets.users,
            &record_id,
            json!({ "last_login": Utc::now().to_rfc3339() }),
        )
        .await?;
        Ok(())
    }

    async fn list_schedules(
        &self,
        username: Option<&str>,
        date: Option<&str>,
    ) -> Result<Vec<Schedule>> {
        let records = self.list_records(&self.sheets.schedules).await?;
        let mut schedules: Vec<Schedule> = records
            .iter()
            .map(|(id, fields)| schedule_from_record(self.schema, id, fields))
            .collect();

        if let Some(username) = username {
            let tag = crate::server::validation::user_tag(username);
            schedules.retain(|s| s.username == username || s.notes.contains(&tag));
        }
        if let Some(date) = date {
            schedules.retain(|s| s.work_date == date);
        }
        Ok(schedules)
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<Schedule> {
        let record_fields = schedule_to_fields(self.schema, schedule);
        let (id, fields) = self
            .create_record(&self.sheets.schedules, record_fields)
            .await?;
        Ok(schedule_from_record(self.schema, &id, &fields))
    }

    async fn update_schedule(
        &self,
        id: &str,
        patch: &SchedulePatch,
    ) -> Result<Option<Schedule>> {
        let record_fields = schedule_patch_to_fields(self.schema, patch);
        let updated = self
            .patch_record(&self.sheets.schedules, id, record_fields)
            .await?;
        Ok(updated.map(|(id, fields)| schedule_from_record(self.schema, &id, &fields)))
    }

    async fn delete_schedule(&self, id: &str) -> Result<bool> {
        self.delete_record(&self.sheets.schedules, id).await
    }

    async fn list_shops(&self) -> Result<Vec<Shop>> {
        let records = self.list_records(&self.sheets.shops).await?;
        let mut shops: Vec<Shop> = records
            .iter()
            .map(|(id, fields)| shop_from_record(id, fields))
            .collect();
        shops.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(shops)
    }

    async fn get_shop(&self, id: &str) -> Result<Option<Shop>> {
        let record = self.shop_record(id).await?;
        Ok(record.map(|(id, fields)| shop_from_record(&id, &fields)))
    }

    async fn create_shop(&self, shop: &Shop) -> Result<Shop> {
        let record_fields = json!({
            "name": shop.name,
            "address": shop.address,
            "contact": shop.contact,
            "phone": shop.phone,
            "notes": shop.notes,
            "created_by": shop.created_by,
            "created_at": shop.created_at.unwrap_or_else(Utc::now).to_rfc3339(),
        });
        let (id, fields) = self.create_record(&self.sheets.shops, record_fields).await?;
        Ok(shop_from_record(&id, &fields))
    }

    async fn update_shop(&self, id: &str, patch: &ShopPatch) -> Result<Option<Shop>> {
        let mut record_fields = Map::new();
        if let Some(name) = &patch.name {
            record_fields.insert("name".into(), json!(name));
        }
        if let Some(address) = &patch.address {
            record_fields.insert("address".into(), json!(address));
        }
        if let Some(contact) = &patch.contact {
            record_fields.insert("contact".into(), json!(contact));
        }
        if let Some(phone) = &patch.phone {
            record_fields.insert("phone".into(), json!(phone));
        }
        if let Some(notes) = &patch.notes {
            record_fields.insert("notes".into(), json!(notes));
        }
        record_fields.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));

        let updated = self
            .patch_record(&self.sheets.shops, id, Value::Object(record_fields))
            .await?;
        Ok(updated.map(|(id, fields)| shop_from_record(&id, &fields)))
    }

    async fn delete_shop(&self, id: &str) -> Result<bool> {
        self.delete_record(&self.sheets.shops, id).await
    }

    async fn get_profile(&self, username: &str) -> Result<Option<Profile>> {
        let record = self
            .find_record(&self.sheets.profiles, "username", username)
            .await?;
        Ok(record.map(|(_, fields)| profile_from_record(&fields)))
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile> {
        let existing = self
            .find_record(&self.sheets.profiles, "username", &profile.username)
            .await?;
        let record_fields = profile_to_fields(profile);
        let saved = match existing {
            Some((record_id, _)) => self
                .patch_record(&self.sheets.profiles, &record_id, record_fields)
                .await?
                .ok_or_else(|| Error::NotFound("profile vanished during upsert".into()))?,
            None => {
                let mut record_fields = record_fields;
                record_fields["createdAt"] = json!(Utc::now().to_rfc3339());
                self.create_record(&self.sheets.profiles, record_fields).await?
            }
        };
        Ok(profile_from_record(&saved.1))
    }

    async fn get_hotel(&self, username: &str) -> Result<Option<Hotel>> {
        let record = self
            .find_record(&self.sheets.hotels, "username", username)
            .await?;
        Ok(record.map(|(_, fields)| hotel_from_record(&fields)))
    }

    async fn upsert_hotel(&self, hotel: &Hotel) -> Result<Hotel> {
        let existing = self
            .find_record(&self.sheets.hotels, "username", &hotel.username)
            .await?;
        let record_fields = json!({
            "username": hotel.username,
            "websiteName": hotel.website_name,
            "updatedAt": Utc::now().to_rfc3339(),
        });
        let saved = match existing {
            Some((record_id, _)) => self
                .patch_record(&self.sheets.hotels, &record_id, record_fields)
                .await?
                .ok_or_else(|| Error::NotFound("hotel record vanished during upsert".into()))?,
            None => {
                let mut record_fields = record_fields;
                record_fields["createdAt"] = json!(Utc::now().to_rfc3339());
                self.create_record(&self.sheets.hotels, record_fields).await?
            }
        };
        Ok(hotel_from_record(&saved.1))
    }

    async fn ping(&self, table: Table) -> TableHealth {
        let sheet = match table {
            Table::Users => &self.sheets.users,
            Table::Schedules => &self.sheets.schedules,
            Table::Shops => &self.sheets.shops,
        };
        let endpoint = format!("{}?pageSize=1&fieldKey=name", self.records_path(sheet));
        match self.client.call(Method::GET, &endpoint, None).await {
            Ok(body) => TableHealth {
                ok: true,
                total: body["data"]["total"].as_u64(),
                error: None,
            },
            Err(e) => TableHealth {
                ok: false,
                total: None,
                error: Some(e.message),
            },
        }
    }
}
