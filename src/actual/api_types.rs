use serde::{Deserialize, Deserializer, Serialize};

/// `{ "status": "ok", "data": … }` or `{ "status": "error", "reason": … }`
#[derive(Deserialize, Debug)]
pub struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
    pub reason: Option<String>,
    pub description: Option<String>,
}

impl<T> Envelope<T> {
    /// The payload, or the server's reason for refusing
    pub fn into_data(self) -> Result<T, String> {
        match (self.status.as_str(), self.data) {
            ("ok", Some(data)) => Ok(data),
            _ => Err(self
                .reason
                .or(self.description)
                .unwrap_or_else(|| format!("unexpected status '{}'", self.status))),
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub login_method: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct LoginData {
    pub token: Option<String>,
}

/// Entry of `/sync/list-user-files`
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserFile {
    pub file_id: String,
    pub group_id: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "loose_flag")]
    pub deleted: bool,
    pub encrypt_key_id: Option<String>,
}

/// Payload of `/sync/get-user-file-info`
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub file_id: String,
    pub group_id: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "loose_flag")]
    pub deleted: bool,
    pub encrypt_meta: Option<EncryptMeta>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptMeta {
    pub key_id: Option<String>,
    pub algorithm: String,
    pub iv: String,
    pub auth_tag: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<&'a str>,
    pub file_id: &'a str,
}

/// Payload of `/sync/user-get-key`
#[derive(Deserialize, Debug, Clone)]
pub struct KeyInfo {
    pub id: String,
    pub salt: String,
    pub test: Option<String>,
}

/// The JSON document stored in `KeyInfo::test`
#[derive(Deserialize, Serialize, Debug)]
pub struct TestMessage {
    pub value: String,
    pub meta: EncryptMeta,
}

// The server stores flags as sqlite integers; older versions send booleans.
fn loose_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_file_flags() {
        let files: Vec<UserFile> = serde_json::from_value(json!([
            { "fileId": "a", "groupId": "g", "name": "A", "deleted": 1, "encryptKeyId": null },
            { "fileId": "b", "groupId": null, "name": "B", "deleted": false },
            { "fileId": "c", "name": "C", "encryptKeyId": "key-1" }
        ]))
        .unwrap();

        assert!(files[0].deleted);
        assert!(!files[1].deleted);
        assert!(!files[2].deleted);
        assert_eq!(files[2].encrypt_key_id.as_deref(), Some("key-1"));
        assert_eq!(files[1].group_id, None);
    }

    #[test]
    fn test_envelope_error_reason() {
        let envelope: Envelope<LoginData> =
            serde_json::from_value(json!({ "status": "error", "reason": "invalid-password" })).unwrap();
        assert_eq!(envelope.into_data().unwrap_err(), "invalid-password");

        let envelope: Envelope<LoginData> =
            serde_json::from_value(json!({ "status": "ok", "data": { "token": "t" } })).unwrap();
        assert_eq!(envelope.into_data().unwrap().token.as_deref(), Some("t"));
    }
}
