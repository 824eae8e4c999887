use serde::{Deserialize, Serialize};
use skein::rpc::ServiceKey;
use skein_rpc_service::BitcodeCodec;
use skein_rpc_service_endpoint::ServiceInvoker;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const USER_SERVICE_NAME: &str = "UserService";
pub const USER_SERVICE_VERSION: &str = "1.0.0";

pub fn user_service_key() -> ServiceKey {
    ServiceKey::new(USER_SERVICE_NAME, USER_SERVICE_VERSION)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

/// In-memory user table backing the example service.
#[derive(Debug, Clone, Default)]
pub struct UserStore {
    users: Arc<Mutex<BTreeMap<u64, User>>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>) -> User {
        let mut users = self.users.lock().unwrap_or_else(|p| p.into_inner());
        let id = users.keys().next_back().map_or(1, |last| last + 1);
        let user = User {
            id,
            name: name.into(),
        };
        users.insert(id, user.clone());
        user
    }

    pub fn get(&self, id: u64) -> Option<User> {
        self.users
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `UserService:1.0.0`
///
/// - `get_user_by_id(u64) -> User`, failing for unknown ids
/// - `create_user(String) -> User`
/// - `count_users() -> u64`
pub fn user_service(store: UserStore) -> ServiceInvoker {
    ServiceInvoker::builder(BitcodeCodec)
        .method("get_user_by_id", {
            let store = store.clone();
            move |(id,): (u64,)| store.get(id).ok_or_else(|| format!("no user with id {id}"))
        })
        .method_async("create_user", {
            let store = store.clone();
            move |(name,): (String,)| {
                let store = store.clone();
                async move {
                    let user = store.insert(name);
                    tracing::debug!(id = user.id, name = %user.name, "Created user");
                    Ok::<_, String>(user)
                }
            }
        })
        .method("count_users", move |(): ()| {
            Ok::<_, String>(store.len() as u64)
        })
        .build()
}
