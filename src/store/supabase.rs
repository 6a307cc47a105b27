use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{Map, Value, json};

use super::RecordStore;
use crate::error::{Error, Result};
use crate::remote::{RemoteClient, RemoteError};
use crate::types::*;

/// Record-store adapter for a PostgREST backend. Tables use snake_case
/// columns throughout; serde renames on the model types line up with them
/// except for the camelCase wire aliases, which are mapped here.
pub struct SupabaseStore {
    client: RemoteClient,
}

impl SupabaseStore {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    async fn select(&self, table: &str, filter: &str) -> Result<Vec<Value>> {
        let endpoint = format!("/rest/v1/{table}?select=*{filter}");
        let body = self.client.get_cached(&endpoint).await?;
        Ok(body.as_array().cloned().unwrap_or_default())
    }

    async fn select_one(&self, table: &str, filter: &str) -> Result<Option<Value>> {
        let endpoint = format!("/rest/v1/{table}?select=*{filter}&limit=1");
        let body = self.client.call(Method::GET, &endpoint, None).await?;
        Ok(body.as_array().and_then(|rows| rows.first().cloned()))
    }

    /// Insert with `Prefer: return=representation` so the created row comes
    /// back in one round trip.
    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let endpoint = format!("/rest/v1/{table}");
        let body = self
            .client
            .call_with_headers(
                Method::POST,
                &endpoint,
                Some(&row),
                &[("Prefer", "return=representation")],
            )
            .await?;
        self.client.invalidate_reads(&format!("/rest/v1/{table}"));
        body.as_array()
            .and_then(|rows| rows.first().cloned())
            .ok_or_else(|| Error::Config(format!("{table} insert returned no row")))
    }

    async fn patch(&self, table: &str, filter: &str, row: Value) -> Result<Option<Value>> {
        let endpoint = format!("/rest/v1/{table}?{filter}");
        let result = self
            .client
            .call_with_headers(
                Method::PATCH,
                &endpoint,
                Some(&row),
                &[("Prefer", "return=representation")],
            )
            .await;
        self.client.invalidate_reads(&format!("/rest/v1/{table}"));
        match result {
            Ok(body) => Ok(body.as_array().and_then(|rows| rows.first().cloned())),
            Err(e) if is_rejection(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, table: &str, filter: &str) -> Result<bool> {
        let endpoint = format!("/rest/v1/{table}?{filter}");
        let result = self
            .client
            .call_with_headers(
                Method::DELETE,
                &endpoint,
                None,
                &[("Prefer", "return=representation")],
            )
            .await;
        self.client.invalidate_reads(&format!("/rest/v1/{table}"));
        match result {
            Ok(body) => Ok(body.as_array().is_some_and(|rows| !rows.is_empty())),
            Err(e) if is_rejection(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_rejection(e: &RemoteError) -> bool {
    matches!(e.status, Some(status) if (400..500).contains(&status) && status != 429)
}

fn eq_filter(column: &str, value: &str) -> String {
    format!("&{column}=eq.{}", urlencoding::encode(value))
}

fn id_filter(id: &str) -> String {
    format!("id=eq.{}", urlencoding::encode(id))
}

fn parse_row<T: serde::de::DeserializeOwned>(row: Value) -> Result<T> {
    Ok(serde_json::from_value(row)?)
}

/// Rows store snake_case columns while the wire models carry camelCase
/// names, so each row is re-keyed before deserializing. Null columns are
/// dropped so that serde defaults apply.
fn rekey(row: Value, mapping: &[(&str, &str)]) -> Value {
    let Value::Object(mut obj) = row else { return row };
    obj.retain(|_, v| !v.is_null());
    let mut out = Map::new();
    for (column, field) in mapping {
        if let Some(v) = obj.remove(*column) {
            out.insert((*field).to_string(), v);
        }
    }
    for (k, v) in obj {
        out.insert(k, v);
    }
    Value::Object(out)
}

const SCHEDULE_COLUMNS: &[(&str, &str)] = &[
    ("work_store", "workStore"),
    ("work_date", "workDate"),
    ("start_time", "startTime"),
    ("end_time", "endTime"),
    ("created_at", "createdAt"),
    ("updated_at", "updatedAt"),
];

const SHOP_COLUMNS: &[(&str, &str)] = &[
    ("created_by", "createdBy"),
    ("created_at", "createdAt"),
    ("updated_at", "updatedAt"),
];

const PROFILE_COLUMNS: &[(&str, &str)] = &[
    ("real_name", "realName"),
    ("id_card", "idCard"),
    ("emergency_contact", "emergencyContact"),
    ("emergency_phone", "emergencyPhone"),
    ("created_at", "createdAt"),
    ("updated_at", "updatedAt"),
];

const HOTEL_COLUMNS: &[(&str, &str)] = &[
    ("website_name", "websiteName"),
    ("created_at", "createdAt"),
    ("updated_at", "updatedAt"),
];

fn schedule_row(schedule: &Schedule) -> Value {
    json!({
        "username": schedule.username,
        "work_store": schedule.work_store,
        "work_date": schedule.work_date,
        "start_time": schedule.start_time,
        "end_time": schedule.end_time,
        "duration": schedule.duration,
        "notes": schedule.notes,
    })
}

fn schedule_patch_row(patch: &SchedulePatch) -> Value {
    let mut row = Map::new();
    if let Some(stores) = &patch.work_store {
        row.insert("work_store".into(), json!(stores));
    }
    if let Some(date) = &patch.work_date {
        row.insert("work_date".into(), json!(date));
    }
    if let Some(start) = &patch.start_time {
        row.insert("start_time".into(), json!(start));
    }
    if let Some(end) = &patch.end_time {
        row.insert("end_time".into(), json!(end));
    }
    if let Some(duration) = patch.duration {
        row.insert("duration".into(), json!(duration));
    }
    if let Some(notes) = &patch.notes {
        row.insert("notes".into(), json!(notes));
    }
    row.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
    Value::Object(row)
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        let row = self
            .select_one("users", &eq_filter("username", username))
            .await?;
        row.map(|r| parse_row(rekey(r, &[("password", "password_hash")])))
            .transpose()
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        let row = self
            .insert(
                "users",
                json!({
                    "id": user.id,
                    "username": user.username,
                    "email": user.email,
                    "phone": user.phone,
                    "password": user.password_hash,
                    "created_at": user.created_at.to_rfc3339(),
                }),
            )
            .await?;
        parse_row(rekey(row, &[("password", "password_hash")]))
    }

    async fn touch_last_login(&self, username: &str) -> Result<()> {
        self.patch(
            "users",
            &format!("username=eq.{}", urlencoding::encode(username)),
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
        // Tagged entries (see the notes user tag) live under another owner's
        // username, so owner filtering happens locally after the fetch.
        let mut filter = String::new();
        if let Some(date) = date {
            filter.push_str(&eq_filter("work_date", date));
        }
        let rows = self.select("schedules", &filter).await?;
        let mut schedules = rows
            .into_iter()
            .map(|row| parse_row::<Schedule>(rekey(row, SCHEDULE_COLUMNS)))
            .collect::<Result<Vec<_>>>()?;
        if let Some(username) = username {
            let tag = crate::server::validation::user_tag(username);
            schedules.retain(|s| s.username == username || s.notes.contains(&tag));
        }
        Ok(schedules)
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<Schedule> {
        let mut row = schedule_row(schedule);
        row["id"] = json!(schedule.id);
        row["created_at"] = json!(Utc::now().to_rfc3339());
        let row = self.insert("schedules", row).await?;
        parse_row(rekey(row, SCHEDULE_COLUMNS))
    }

    async fn update_schedule(
        &self,
        id: &str,
        patch: &SchedulePatch,
    ) -> Result<Option<Schedule>> {
        let row = self
            .patch("schedules", &id_filter(id), schedule_patch_row(patch))
            .await?;
        row.map(|r| parse_row(rekey(r, SCHEDULE_COLUMNS))).transpose()
    }

    async fn delete_schedule(&self, id: &str) -> Result<bool> {
        self.delete("schedules", &id_filter(id)).await
    }

    async fn list_shops(&self) -> Result<Vec<Shop>> {
        let rows = self.select("shops", "&order=name.asc").await?;
        rows.into_iter()
            .map(|row| parse_row(rekey(row, SHOP_COLUMNS)))
            .collect()
    }

    async fn get_shop(&self, id: &str) -> Result<Option<Shop>> {
        let row = self.select_one("shops", &format!("&{}", id_filter(id))).await?;
        row.map(|r| parse_row(rekey(r, SHOP_COLUMNS))).transpose()
    }

    async fn create_shop(&self, shop: &Shop) -> Result<Shop> {
        let row = self
            .insert(
                "shops",
                json!({
                    "id": shop.id,
                    "name": shop.name,
                    "address": shop.address,
                    "contact": shop.contact,
                    "phone": shop.phone,
                    "notes": shop.notes,
                    "created_by": shop.created_by,
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        parse_row(rekey(row, SHOP_COLUMNS))
    }

    async fn update_shop(&self, id: &str, patch: &ShopPatch) -> Result<Option<Shop>> {
        let mut row = Map::new();
        if let Some(name) = &patch.name {
            row.insert("name".into(), json!(name));
        }
        if let Some(address) = &patch.address {
            row.insert("address".into(), json!(address));
        }
        if let Some(contact) = &patch.contact {
            row.insert("contact".into(), json!(contact));
        }
        if let Some(phone) = &patch.phone {
            row.insert("phone".into(), json!(phone));
        }
        if let Some(notes) = &patch.notes {
            row.insert("notes".into(), json!(notes));
        }
        row.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));

        let updated = self
            .patch("shops", &id_filter(id), Value::Object(row))
            .await?;
        updated.map(|r| parse_row(rekey(r, SHOP_COLUMNS))).transpose()
    }

    async fn delete_shop(&self, id: &str) -> Result<bool> {
        self.delete("shops", &id_filter(id)).await
    }

    async fn get_profile(&self, username: &str) -> Result<Option<Profile>> {
        let row = self
            .select_one("profiles", &eq_filter("username", username))
            .await?;
        row.map(|r| parse_row(rekey(r, PROFILE_COLUMNS))).transpose()
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile> {
        let filter = format!("username=eq.{}", urlencoding::encode(&profile.username));
        let row = json!({
            "username": profile.username,
            "real_name": profile.real_name,
            "phone": profile.phone,
            "id_card": profile.id_card,
            "emergency_contact": profile.emergency_contact,
            "emergency_phone": profile.emergency_phone,
            "address": profile.address,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let existing = self.patch("profiles", &filter, row.clone()).await?;
        let saved = match existing {
            Some(saved) => saved,
            None => {
                let mut row = row;
                row["created_at"] = json!(Utc::now().to_rfc3339());
                self.insert("profiles", row).await?
            }
        };
        parse_row(rekey(saved, PROFILE_COLUMNS))
    }

    async fn get_hotel(&self, username: &str) -> Result<Option<Hotel>> {
        let row = self
            .select_one("hotel_settings", &eq_filter("username", username))
            .await?;
        row.map(|r| parse_row(rekey(r, HOTEL_COLUMNS))).transpose()
    }

    async fn upsert_hotel(&self, hotel: &Hotel) -> Result<Hotel> {
        let filter = format!("username=eq.{}", urlencoding::encode(&hotel.username));
        let row = json!({
            "username": hotel.username,
            "website_name": hotel.website_name,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let existing = self.patch("hotel_settings", &filter, row.clone()).await?;
        let saved = match existing {
            Some(saved) => saved,
            None => {
                let mut row = row;
                row["created_at"] = json!(Utc::now().to_rfc3339());
                self.insert("hotel_settings", row).await?
            }
        };
        parse_row(rekey(saved, HOTEL_COLUMNS))
    }

    async fn ping(&self, table: Table) -> TableHealth {
        let endpoint = format!("/rest/v1/{}?select=id&limit=1", table.as_str());
        match self
            .client
            .call_with_headers(Method::GET, &endpoint, None, &[("Prefer", "count=exact")])
            .await
        {
            Ok(body) => TableHealth {
                ok: true,
                total: body.as_array().map(|rows| rows.len() as u64),
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
