use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standalone row that shadows an extra stored at the same path
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShadowingItem {
    pub user_data_key: Option<String>,
    pub kind: String,
    pub extra_ids: Option<String>,
}

/// Row deleted by the repair pass, with the extra type of the row it duplicated
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IncorrectItem {
    pub guid: Vec<u8>,
    pub name: Option<String>,
    pub kind: String,
    pub duplicated_extra_type: Option<String>,
}

/// Any item's extras reference list
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExtrasList {
    pub guid: Vec<u8>,
    pub extra_ids: Option<String>,
    pub name: Option<String>,
}

/// Rows sharing one path
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PathGroup {
    pub path: String,
    pub total: i64,
    pub extras: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LocalUserRow {
    pub id: i64,
    pub guid: Vec<u8>,
    pub data: Vec<u8>,
}

/// JSON document stored in LocalUsersv2.data
///
/// Kept as the raw object so key order and explicit nulls survive a
/// rewrite; only the fields the login repair touches have accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserData {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl UserData {
    pub fn name(&self) -> Option<&str> {
        self.fields.get("Name").and_then(|name| name.as_str())
    }

    pub fn display_name(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }

    pub fn has_pin(&self) -> bool {
        self.fields
            .get("EasyPassword")
            .and_then(|pin| pin.as_str())
            .map(|pin| !pin.is_empty())
            .unwrap_or(false)
    }

    /// Drop the PIN hash entirely, as the server does when a PIN is removed
    pub fn clear_pin(&mut self) {
        self.fields.retain(|key, _| key != "EasyPassword");
    }

    /// Set the password hash, keeping the key where it was
    pub fn set_password(&mut self, hash: String) {
        self.fields
            .insert("Password".to_string(), serde_json::Value::String(hash));
    }
}

/// Format a GUID column for display
///
/// Jellyfin stores GUIDs as 16 bytes in .NET layout (first three groups
/// little-endian). Anything else is shown as plain hex.
pub fn format_guid(bytes: &[u8]) -> String {
    match Uuid::from_slice_le(bytes) {
        Ok(uuid) => uuid.simple().to_string(),
        Err(_) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_guid_dotnet_layout() {
        let bytes = [
            0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        assert_eq!(format_guid(&bytes), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn test_format_guid_odd_length_falls_back_to_hex() {
        assert_eq!(format_guid(&[0x01, 0xab]), "01ab");
    }

    #[test]
    fn test_user_data_keeps_unknown_fields() {
        let raw = r#"{"Name":"alice","Password":"$SHA1$AA","EasyPassword":"1234","Id":"x","Policy":{"a":1}}"#;
        let mut data: UserData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.display_name(), "alice");
        assert!(data.has_pin());

        data.clear_pin();
        assert!(!data.has_pin());
        assert_eq!(
            serde_json::to_string(&data).unwrap(),
            r#"{"Name":"alice","Password":"$SHA1$AA","Id":"x","Policy":{"a":1}}"#
        );
    }

    #[test]
    fn test_user_data_rewrite_keeps_order_and_nulls() {
        let raw = r#"{"Name":"a","EasyPassword":null,"Password":null,"Zeta":1,"Alpha":2}"#;
        let mut data: UserData = serde_json::from_str(raw).unwrap();
        assert!(!data.has_pin());
        assert_eq!(serde_json::to_string(&data).unwrap(), raw);

        data.set_password("$SHA1$BB".to_string());
        assert_eq!(
            serde_json::to_string(&data).unwrap(),
            r#"{"Name":"a","EasyPassword":null,"Password":"$SHA1$BB","Zeta":1,"Alpha":2}"#
        );
    }

    #[test]
    fn test_empty_pin_is_not_set() {
        let data: UserData = serde_json::from_str(r#"{"Name":"bob","EasyPassword":""}"#).unwrap();
        assert!(!data.has_pin());
    }
}
