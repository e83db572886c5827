use std::str::FromStr;

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::OffsetDateTime;
use tracing::info;

use crate::error::{ApiError, ApiResult};

/// Length of the generated chat key, the sole credential for a booking's room.
const CHAT_KEY_LEN: usize = 21;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub date: String,
    pub time: String,
    pub hours: i64,
    pub project_details: Option<String>,
    pub service_type: String,
    pub is_confirmed: bool,
    pub chat_key: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub booking_id: i64,
    pub sender: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub name: String,
    pub email: String,
    pub date: String,
    pub time: String,
    pub hours: i64,
    #[serde(default)]
    pub project_details: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
}

impl NewBooking {
    pub fn validate(&self) -> ApiResult<()> {
        require("name", &self.name)?;
        require("email", &self.email)?;
        require("date", &self.date)?;
        require("time", &self.time)?;
        if self.hours < 1 {
            return Err(ApiError::validation("hours must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChatMessage {
    pub booking_id: i64,
    pub sender: String,
    pub message: String,
}

impl NewChatMessage {
    pub fn validate(&self) -> ApiResult<()> {
        require("sender", &self.sender)?;
        require("message", &self.message)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl NewContact {
    pub fn validate(&self) -> ApiResult<()> {
        require("name", &self.name)?;
        require("email", &self.email)?;
        require("subject", &self.subject)?;
        require("message", &self.message)
    }
}

fn require(field: &'static str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn generate_chat_key() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(CHAT_KEY_LEN)
        .map(char::from)
        .collect()
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bookings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    hours INTEGER NOT NULL,
    project_details TEXT,
    service_type TEXT NOT NULL DEFAULT 'website',
    is_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
    chat_key TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    subject TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    booking_id INTEGER NOT NULL REFERENCES bookings(id),
    sender TEXT NOT NULL,
    message TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chat_messages_booking_id ON chat_messages(booking_id);
";

/// Single source of truth for bookings, contacts and chat messages.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str) -> ApiResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every pooled connection to sqlite::memory: would open its own
        // empty database, so in-memory stores get a single connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 16 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        info!(url, "store opened");
        Ok(Self { pool })
    }

    pub async fn in_memory() -> ApiResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn create_booking(&self, new: NewBooking) -> ApiResult<Booking> {
        let chat_key = generate_chat_key();
        let service_type = new.service_type.unwrap_or_else(|| "website".to_owned());

        let result = sqlx::query(
            "INSERT INTO bookings (name,email,date,time,hours,project_details,service_type,is_confirmed,chat_key)
             VALUES (?,?,?,?,?,?,?,TRUE,?)",
        )
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.date)
        .bind(&new.time)
        .bind(new.hours)
        .bind(&new.project_details)
        .bind(&service_type)
        .bind(&chat_key)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(id, date = %new.date, "booking created");

        Ok(Booking {
            id,
            name: new.name,
            email: new.email,
            date: new.date,
            time: new.time,
            hours: new.hours,
            project_details: new.project_details,
            service_type,
            is_confirmed: true,
            chat_key,
        })
    }

    pub async fn booking(&self, id: i64) -> ApiResult<Option<Booking>> {
        let booking = sqlx::query_as(
            "SELECT id,name,email,date,time,hours,project_details,service_type,is_confirmed,chat_key
             FROM bookings WHERE id=?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    pub async fn bookings(&self) -> ApiResult<Vec<Booking>> {
        let bookings = sqlx::query_as(
            "SELECT id,name,email,date,time,hours,project_details,service_type,is_confirmed,chat_key
             FROM bookings ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    pub async fn bookings_by_email(&self, email: &str) -> ApiResult<Vec<Booking>> {
        let bookings = sqlx::query_as(
            "SELECT id,name,email,date,time,hours,project_details,service_type,is_confirmed,chat_key
             FROM bookings WHERE email=? ORDER BY id ASC",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    /// Resolve a chat key to its booking. The key is the sole credential for
    /// joining that booking's room; both the HTTP pre-flight check and the
    /// WebSocket join go through here.
    pub async fn booking_by_chat_key(&self, chat_key: &str) -> ApiResult<Option<Booking>> {
        let booking = sqlx::query_as(
            "SELECT id,name,email,date,time,hours,project_details,service_type,is_confirmed,chat_key
             FROM bookings WHERE chat_key=?",
        )
        .bind(chat_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    /// Persist a chat message, assigning its id and timestamp. The booking id
    /// must reference an existing booking.
    pub async fn create_chat_message(&self, new: NewChatMessage) -> ApiResult<ChatMessage> {
        let booking: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM bookings WHERE id=?")
            .bind(new.booking_id)
            .fetch_optional(&self.pool)
            .await?;
        if booking.is_none() {
            return Err(ApiError::NotFound("Booking"));
        }

        let timestamp = OffsetDateTime::now_utc();
        let result = sqlx::query(
            "INSERT INTO chat_messages (booking_id,sender,message,timestamp) VALUES (?,?,?,?)",
        )
        .bind(new.booking_id)
        .bind(&new.sender)
        .bind(&new.message)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(ChatMessage {
            id: result.last_insert_rowid(),
            booking_id: new.booking_id,
            sender: new.sender,
            message: new.message,
            timestamp,
        })
    }

    /// All messages for a booking, oldest first.
    pub async fn chat_messages(&self, booking_id: i64) -> ApiResult<Vec<ChatMessage>> {
        let messages = sqlx::query_as(
            "SELECT id,booking_id,sender,message,timestamp FROM chat_messages
             WHERE booking_id=? ORDER BY timestamp ASC, id ASC",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    pub async fn create_contact(&self, new: NewContact) -> ApiResult<Contact> {
        let created_at = OffsetDateTime::now_utc();
        let result = sqlx::query(
            "INSERT INTO contacts (name,email,subject,message,created_at) VALUES (?,?,?,?,?)",
        )
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.subject)
        .bind(&new.message)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Contact {
            id: result.last_insert_rowid(),
            name: new.name,
            email: new.email,
            subject: new.subject,
            message: new.message,
            created_at,
        })
    }

    pub async fn contacts(&self) -> ApiResult<Vec<Contact>> {
        let contacts = sqlx::query_as(
            "SELECT id,name,email,subject,message,created_at FROM contacts ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking_payload(name: &str, email: &str) -> NewBooking {
        NewBooking {
            name: name.to_owned(),
            email: email.to_owned(),
            date: "2025-06-12".to_owned(),
            time: "14:00".to_owned(),
            hours: 2,
            project_details: None,
            service_type: None,
        }
    }

    #[tokio::test]
    async fn chat_keys_are_unique_and_resolve_back() {
        let store = Store::in_memory().await.unwrap();
        let mut keys = Vec::new();

        for i in 0..5 {
            let booking = store
                .create_booking(booking_payload(&format!("Client {i}"), "client@example.com"))
                .await
                .unwrap();
            assert_eq!(booking.chat_key.len(), CHAT_KEY_LEN);
            keys.push((booking.id, booking.chat_key));
        }

        for (id, key) in &keys {
            let resolved = store.booking_by_chat_key(key).await.unwrap().unwrap();
            assert_eq!(resolved.id, *id);
        }

        let mut deduped: Vec<_> = keys.iter().map(|(_, k)| k.clone()).collect();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), keys.len());
    }

    #[tokio::test]
    async fn unknown_chat_key_resolves_to_nothing() {
        let store = Store::in_memory().await.unwrap();
        store
            .create_booking(booking_payload("Ada", "ada@example.com"))
            .await
            .unwrap();

        assert!(
            store
                .booking_by_chat_key("not-a-real-key")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn messages_come_back_in_insertion_order() {
        let store = Store::in_memory().await.unwrap();
        let booking = store
            .create_booking(booking_payload("Ada", "ada@example.com"))
            .await
            .unwrap();

        for i in 0..5 {
            store
                .create_chat_message(NewChatMessage {
                    booking_id: booking.id,
                    sender: "Ada".to_owned(),
                    message: format!("message {i}"),
                })
                .await
                .unwrap();
        }

        let messages = store.chat_messages(booking.id).await.unwrap();
        assert_eq!(messages.len(), 5);
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message.message, format!("message {i}"));
        }
        for pair in messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[tokio::test]
    async fn message_for_unknown_booking_is_rejected() {
        let store = Store::in_memory().await.unwrap();
        let err = store
            .create_chat_message(NewChatMessage {
                booking_id: 999,
                sender: "Ada".to_owned(),
                message: "hello?".to_owned(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(store.chat_messages(999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bookings_are_confirmed_with_default_service_type() {
        let store = Store::in_memory().await.unwrap();
        let created = store
            .create_booking(booking_payload("Ada", "ada@example.com"))
            .await
            .unwrap();

        let fetched = store.booking(created.id).await.unwrap().unwrap();
        assert!(fetched.is_confirmed);
        assert_eq!(fetched.service_type, "website");
        assert_eq!(fetched.project_details, None);
        assert_eq!(fetched.chat_key, created.chat_key);
    }

    #[tokio::test]
    async fn missing_booking_is_none() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.booking(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bookings_by_email_filters() {
        let store = Store::in_memory().await.unwrap();
        store
            .create_booking(booking_payload("Ada", "ada@example.com"))
            .await
            .unwrap();
        store
            .create_booking(booking_payload("Grace", "grace@example.com"))
            .await
            .unwrap();
        store
            .create_booking(booking_payload("Ada again", "ada@example.com"))
            .await
            .unwrap();

        let all = store.bookings().await.unwrap();
        assert_eq!(all.len(), 3);

        let adas = store.bookings_by_email("ada@example.com").await.unwrap();
        assert_eq!(adas.len(), 2);
        assert!(adas.iter().all(|b| b.email == "ada@example.com"));
    }

    #[tokio::test]
    async fn contact_round_trip() {
        let store = Store::in_memory().await.unwrap();
        let created = store
            .create_contact(NewContact {
                name: "Ada".to_owned(),
                email: "ada@example.com".to_owned(),
                subject: "Quote".to_owned(),
                message: "How much for a landing page?".to_owned(),
            })
            .await
            .unwrap();

        let contacts = store.contacts().await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, created.id);
        assert_eq!(contacts[0].subject, "Quote");
        assert!((contacts[0].created_at - created.created_at).abs() < time::Duration::SECOND);
    }

    #[test]
    fn validation_contract() {
        let mut booking = booking_payload("", "ada@example.com");
        assert!(booking.validate().is_err());
        booking.name = "Ada".to_owned();
        assert!(booking.validate().is_ok());
        booking.hours = 0;
        assert!(booking.validate().is_err());

        let message = NewChatMessage {
            booking_id: 1,
            sender: "Ada".to_owned(),
            message: "  ".to_owned(),
        };
        assert!(message.validate().is_err());

        let contact = NewContact {
            name: "Ada".to_owned(),
            email: "ada@example.com".to_owned(),
            subject: String::new(),
            message: "hi".to_owned(),
        };
        assert!(contact.validate().is_err());
    }
}
