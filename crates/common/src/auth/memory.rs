use super::{AccountStore, AdminAccount};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

/// Account store held in process memory
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<Vec<AdminAccount>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<AdminAccount>> {
        Ok(self
            .accounts
            .read()
            .await
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn primary_account(&self) -> Result<Option<AdminAccount>> {
        Ok(self.accounts.read().await.first().cloned())
    }

    async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        security_code_hash: &str,
    ) -> Result<AdminAccount> {
        let mut accounts = self.accounts.write().await;
        if accounts.iter().any(|a| a.username == username) {
            return Err(AppError::Conflict {
                message: format!("account {} already exists", username),
            });
        }

        let now = Utc::now();
        let account = AdminAccount {
            id: accounts.iter().map(|a| a.id).max().unwrap_or(0) + 1,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            security_code_hash: security_code_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        accounts.push(account.clone());
        Ok(account)
    }

    async fn update_password_hash(&self, id: i32, password_hash: &str) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound {
                resource_type: "admin_account".to_string(),
                id: id.to_string(),
            })?;

        account.password_hash = password_hash.to_string();
        account.updated_at = Utc::now();
        Ok(())
    }
}
