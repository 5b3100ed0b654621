use serde::Serialize;

use crate::db::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grant {
    Role { role: Role },
    Frame,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreItem {
    pub key: &'static str,
    pub name: &'static str,
    pub price: i64,
    #[serde(flatten)]
    pub grant: Grant,
}

pub const CATALOGUE: &[StoreItem] = &[
    StoreItem { key: "vip", name: "VIP", price: 5_000, grant: Grant::Role { role: Role::Vip } },
    StoreItem { key: "aristocracy", name: "Aristocracy", price: 20_000, grant: Grant::Role { role: Role::Aristocracy } },
    StoreItem { key: "frame_neon", name: "Neon frame", price: 800, grant: Grant::Frame },
    StoreItem { key: "frame_gold", name: "Gold frame", price: 1_500, grant: Grant::Frame },
    StoreItem { key: "frame_ember", name: "Ember frame", price: 2_500, grant: Grant::Frame },
];

pub fn find(key: &str) -> Option<&'static StoreItem> {
    CATALOGUE.iter().find(|item| item.key == key)
}

/// Higher ranks include everything below them. Admins sit outside the ladder.
pub(crate) fn rank(role: Role) -> Option<u8> {
    match role {
        Role::User => Some(0),
        Role::Vip => Some(1),
        Role::Aristocracy => Some(2),
        Role::Admin => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique() {
        for (i, item) in CATALOGUE.iter().enumerate() {
            assert!(CATALOGUE[i + 1..].iter().all(|other| other.key != item.key), "{}", item.key);
            assert!(item.price > 0);
        }
    }

    #[test]
    fn items_serialize_flat() {
        let json = serde_json::to_value(find("vip").unwrap()).unwrap();
        assert_eq!(json["kind"], "role");
        assert_eq!(json["role"], "vip");
        assert_eq!(serde_json::to_value(find("frame_neon").unwrap()).unwrap()["kind"], "frame");
        assert!(find("nope").is_none());
    }
}
