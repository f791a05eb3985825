use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use utoipa::ToSchema;

/// A file moving between the project store and a sandbox mount, tagged with
/// its git blob hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Artifact {
    pub path: String,
    #[serde(with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub content: Vec<u8>,
    pub sha: String,
}

impl Artifact {
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        let sha = git_blob_sha(&content);
        Self {
            path: path.into(),
            content,
            sha,
        }
    }
}

/// Source file as submitted by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl From<SourceFile> for Artifact {
    fn from(file: SourceFile) -> Self {
        Artifact::new(file.path, file.content.into_bytes())
    }
}

/// Hash git assigns to a blob with this content, which is also the sha the
/// version store reports for the file.
pub fn git_blob_sha(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Decides which stored files count as compiled output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMatcher {
    suffixes: Vec<String>,
}

impl ArtifactMatcher {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    /// Parses a comma separated list such as `.class,.jar`.
    pub fn from_list(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim))
    }

    pub fn is_compiled(&self, path: &str) -> bool {
        self.suffixes.iter().any(|suffix| path.ends_with(suffix.as_str()))
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

impl Default for ArtifactMatcher {
    fn default() -> Self {
        Self::new([".class"])
    }
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_sha_matches_git() {
        // `echo hello | git hash-object --stdin`
        assert_eq!(git_blob_sha(b"hello\n"), "ce013625030ba8dba906f756967f9e9ca394464a");
        // `git hash-object /dev/null`
        assert_eq!(git_blob_sha(b""), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn matcher_uses_configured_suffixes() {
        let matcher = ArtifactMatcher::from_list(".class, .jar,");
        assert!(matcher.is_compiled("bin/Main.class"));
        assert!(matcher.is_compiled("lib/app.jar"));
        assert!(!matcher.is_compiled("src/Main.java"));
        assert_eq!(matcher.suffixes().len(), 2);
    }

    #[test]
    fn content_is_base64_on_the_wire() {
        let artifact = Artifact::new("Main.class", vec![0xca, 0xfe, 0xba, 0xbe]);
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["content"], "yv66vg==");

        let back: Artifact = serde_json::from_value(json).unwrap();
        assert_eq!(back, artifact);
    }
}
