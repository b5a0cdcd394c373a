//! uid -> user name lookup

use std::collections::HashMap;

/// Snapshot of the system's user database
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    names: HashMap<u32, String>,
}

impl UserTable {
    /// Read every user known to the system
    pub fn load() -> Self {
        let users = sysinfo::Users::new_with_refreshed_list();
        Self {
            names: users
                .list()
                .iter()
                .map(|user| (**user.id(), user.name().to_string()))
                .collect(),
        }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (u32, &'a str)>) -> Self {
        Self {
            names: pairs
                .into_iter()
                .map(|(uid, name)| (uid, name.to_string()))
                .collect(),
        }
    }

    pub fn name(&self, uid: u32) -> Option<String> {
        self.names.get(&uid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let users = UserTable::from_pairs([(0, "root"), (33, "www-data")]);
        assert_eq!(users.name(33).as_deref(), Some("www-data"));
        assert_eq!(users.name(1000), None);
    }

    #[test]
    #[ignore] // Reads the live user database
    fn test_load_knows_root() {
        assert_eq!(UserTable::load().name(0).as_deref(), Some("root"));
    }
}
