//! User directory
//!
//! All provisioned users, keyed by user name, persisted as one JSON object.
//! The whole file is rewritten after every change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

use crate::models::User;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid user data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("User not found: {0}")]
    NotFound(String),
    #[error("User already exists: {0}")]
    AlreadyExists(String),
}

pub struct UserDirectory {
    path: PathBuf,
    users: RwLock<HashMap<String, User>>,
}

impl UserDirectory {
    /// Load the directory from `path`; a missing file is an empty directory
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref().to_path_buf();

        let users: HashMap<String, User> = if fs::try_exists(&path).await? {
            tracing::debug!("Read users data from {:?}", path);
            let json = fs::read(&path).await?;
            serde_json::from_slice(&json)?
        } else {
            HashMap::new()
        };
        tracing::info!("Loaded {} users", users.len());

        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    pub async fn get(&self, user_name: &str) -> Option<User> {
        self.users.read().await.get(user_name).cloned()
    }

    pub async fn contains(&self, user_name: &str) -> bool {
        self.users.read().await.contains_key(user_name)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Add a new user and save
    pub async fn insert(&self, user: User) -> Result<(), DirectoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.user_name) {
            return Err(DirectoryError::AlreadyExists(user.user_name));
        }
        let name = user.user_name.clone();
        users.insert(name.clone(), user);
        if let Err(e) = self.save(&users).await {
            users.remove(&name);
            return Err(e);
        }
        Ok(())
    }

    /// Merge `patch` into an existing user and save
    pub async fn update(&self, user_name: &str, patch: Map<String, Value>) -> Result<User, DirectoryError> {
        let mut users = self.users.write().await;
        let mut updated = users
            .get(user_name)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(user_name.to_string()))?;
        updated.merge(patch)?;

        let previous = users.insert(user_name.to_string(), updated.clone());
        if let Err(e) = self.save(&users).await {
            if let Some(previous) = previous {
                users.insert(user_name.to_string(), previous);
            }
            return Err(e);
        }
        Ok(updated)
    }

    /// Remove a user and save, returning the removed record
    pub async fn remove(&self, user_name: &str) -> Result<User, DirectoryError> {
        let mut users = self.users.write().await;
        let user = users
            .remove(user_name)
            .ok_or_else(|| DirectoryError::NotFound(user_name.to_string()))?;
        if let Err(e) = self.save(&users).await {
            users.insert(user_name.to_string(), user);
            return Err(e);
        }
        Ok(user)
    }

    // Callers hold the write lock, so saves never interleave. Callers roll
    // their change back when the save fails.
    async fn save(&self, users: &HashMap<String, User>) -> Result<(), DirectoryError> {
        let json = serde_json::to_vec(users)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }
}
