use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    model::{NewUser, User},
    repo::{StoreError, UserStore},
};

#[derive(Debug, Clone)]
struct Record {
    user: User,
    tokens: Vec<String>,
    avatar: Option<Vec<u8>>,
}

/// In-memory `UserStore` used by handler tests.
#[derive(Default)]
pub struct MemoryUserStore {
    records: RwLock<HashMap<Uuid, Record>>,
}

impl MemoryUserStore {
    pub async fn tokens(&self, id: Uuid) -> Vec<String> {
        self.records
            .read()
            .await
            .get(&id)
            .map(|r| r.tokens.clone())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    fn email_taken(records: &HashMap<Uuid, Record>, email: &str, except: Option<Uuid>) -> bool {
        records
            .values()
            .any(|r| r.user.email == email && Some(r.user.id) != except)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut records = self.records.write().await;
        if Self::email_taken(&records, &new.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            age: new.age,
            created_at: now,
            updated_at: now,
        };
        records.insert(
            user.id,
            Record {
                user: user.clone(),
                tokens: Vec::new(),
                avatar: None,
            },
        );
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.records.read().await.get(&id).map(|r| r.user.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.user.email == email)
            .map(|r| r.user.clone()))
    }

    async fn find_by_token(&self, id: Uuid, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(&id)
            .filter(|r| r.tokens.iter().any(|t| t == token))
            .map(|r| r.user.clone()))
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let mut records = self.records.write().await;
        if Self::email_taken(&records, &user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail);
        }
        let record = records
            .get_mut(&user.id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        record.user = User {
            updated_at: OffsetDateTime::now_utc(),
            ..user.clone()
        };
        Ok(record.user.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn add_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        if let Some(r) = self.records.write().await.get_mut(&id) {
            r.tokens.push(token.to_string());
        }
        Ok(())
    }

    async fn remove_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        if let Some(r) = self.records.write().await.get_mut(&id) {
            r.tokens.retain(|t| t != token);
        }
        Ok(())
    }

    async fn clear_tokens(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(r) = self.records.write().await.get_mut(&id) {
            r.tokens.clear();
        }
        Ok(())
    }

    async fn set_avatar(&self, id: Uuid, avatar: Option<Vec<u8>>) -> Result<(), StoreError> {
        if let Some(r) = self.records.write().await.get_mut(&id) {
            r.avatar = avatar;
        }
        Ok(())
    }

    async fn avatar(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(&id)
            .and_then(|r| r.avatar.clone()))
    }
}
