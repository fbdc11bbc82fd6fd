//! Path (de)serialization that survives non-UTF-8 file names.
//!
//! UTF-8 paths are stored verbatim; anything else is stored as `b64:<payload>` where the
//! payload is the platform's raw path bytes (UTF-16LE units on Windows).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

const B64_PREFIX: &str = "b64:";

pub fn serialize<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&encode(path))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    decode(&text).map_err(serde::de::Error::custom)
}

/// Helpers for `Option<PathBuf>` fields.
pub mod option {
    use super::*;

    pub fn serialize<S>(value: &Option<PathBuf>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(path) => serializer.serialize_some(&encode(path)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|text| decode(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Helpers for `Vec<PathBuf>` fields.
pub mod list {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(value: &[PathBuf], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(value.len()))?;
        for path in value {
            seq.serialize_element(&encode(path))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<PathBuf>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|text| decode(text).map_err(serde::de::Error::custom))
            .collect()
    }
}

fn encode(path: &Path) -> String {
    match path.to_str() {
        Some(text) => text.to_string(),
        None => format!("{B64_PREFIX}{}", BASE64.encode(raw_bytes(path))),
    }
}

fn decode(text: &str) -> Result<PathBuf, String> {
    let Some(payload) = text.strip_prefix(B64_PREFIX) else {
        return Ok(PathBuf::from(text));
    };
    let bytes = BASE64
        .decode(payload.as_bytes())
        .map_err(|err| format!("invalid base64 path payload: {err}"))?;
    from_raw_bytes(bytes).map(PathBuf::from)
}

#[cfg(unix)]
fn raw_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn from_raw_bytes(bytes: Vec<u8>) -> Result<OsString, String> {
    use std::os::unix::ffi::OsStringExt;
    Ok(OsString::from_vec(bytes))
}

#[cfg(windows)]
fn raw_bytes(path: &Path) -> Vec<u8> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str()
        .encode_wide()
        .flat_map(u16::to_le_bytes)
        .collect()
}

#[cfg(windows)]
fn from_raw_bytes(bytes: Vec<u8>) -> Result<OsString, String> {
    use std::os::windows::ffi::OsStringExt;
    if bytes.len() % 2 != 0 {
        return Err("encoded Windows path has odd byte length".to_string());
    }
    let wide: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(OsString::from_wide(&wide))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_stay_readable() {
        assert_eq!(encode(Path::new("/srv/project")), "/srv/project");
        assert_eq!(decode("/srv/project").unwrap(), PathBuf::from("/srv/project"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_use_base64() {
        use std::os::unix::ffi::OsStringExt;

        let path = PathBuf::from(OsString::from_vec(vec![b'/', b't', 0xff, b'x']));
        let encoded = encode(&path);
        assert!(encoded.starts_with(B64_PREFIX));
        assert_eq!(decode(&encoded).unwrap(), path);
    }

    #[test]
    fn corrupt_payload_is_rejected() {
        assert!(decode("b64:***").is_err());
    }
}
