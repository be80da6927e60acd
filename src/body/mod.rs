//! Request body decoding — JSON, urlencoded forms, and multipart.
//!
//! The entry point is [`parse_into`], which inspects the request's
//! `Content-Type` and dispatches to the matching decoder. Form and multipart
//! text fields are lifted into a `serde_json` object and deserialized through
//! the target's serde derive, so a JSON body and a form body carrying the
//! same fields populate identical shapes.

use std::path::Path;

use bytes::Bytes;
use futures_util::stream;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::http::request::parse_urlencoded;

/// A file received through a `multipart/form-data` field.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    field: String,
    filename: String,
    bytes: Bytes,
}

impl UploadedFile {
    /// The multipart field name the file arrived under.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The client-supplied filename.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The file contents.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Writes the file contents to `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(&self.bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Splits a `Content-Type` value into its media type, dropping parameters
/// such as `charset` or `boundary`.
fn media_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Decodes a buffered `multipart/form-data` body into text fields and files.
///
/// The body is already fully read by the server loop, so it is fed to
/// `multer` as a single-chunk stream.
pub(crate) async fn parse_multipart(
    content_type: &str,
    body: Bytes,
) -> Result<(Vec<(String, String)>, Vec<UploadedFile>), Error> {
    let boundary = multer::parse_boundary(content_type)?;
    let mut multipart = multer::Multipart::new(
        stream::once(async move { Ok::<_, std::io::Error>(body) }),
        boundary,
    );

    let mut fields = Vec::new();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_owned();
        let filename = field.file_name().map(str::to_owned);

        match filename {
            Some(filename) => {
                let bytes = field.bytes().await?;
                files.push(UploadedFile {
                    field: name,
                    filename,
                    bytes,
                });
            }
            None => {
                let value = field.text().await?;
                fields.push((name, value));
            }
        }
    }

    Ok((fields, files))
}

/// Lifts decoded `(name, value)` pairs into a JSON object and deserializes it
/// into `T`, resolving each field through the target's serde attributes.
fn fields_into<T: DeserializeOwned>(pairs: Vec<(String, String)>) -> Result<T, Error> {
    let mut object = serde_json::Map::new();
    for (name, value) in pairs {
        object.insert(name, serde_json::Value::String(value));
    }
    Ok(serde_json::from_value(serde_json::Value::Object(object))?)
}

/// Decodes `body` into `T` according to `content_type`.
///
/// | Media type                          | Decoder                          |
/// |-------------------------------------|----------------------------------|
/// | `application/json`                  | `serde_json::from_slice`         |
/// | `application/x-www-form-urlencoded` | urlencoded pairs → serde         |
/// | `multipart/form-data`               | multipart text fields → serde    |
///
/// # Errors
///
/// - [`Error::UnsupportedMediaType`] — missing or unhandled `Content-Type`.
/// - [`Error::Decode`] — the body is malformed for its declared type.
pub(crate) async fn parse_into<T: DeserializeOwned>(
    content_type: Option<&str>,
    body: &Bytes,
) -> Result<T, Error> {
    let content_type =
        content_type.ok_or_else(|| Error::UnsupportedMediaType("<missing>".to_owned()))?;

    match media_type(content_type) {
        "application/json" => Ok(serde_json::from_slice(body)?),
        "application/x-www-form-urlencoded" => {
            let text = std::str::from_utf8(body)
                .map_err(|e| Error::Decode(format!("form body is not UTF-8: {e}")))?;
            fields_into(parse_urlencoded(text))
        }
        "multipart/form-data" => {
            let (fields, _files) = parse_multipart(content_type, body.clone()).await?;
            fields_into(fields)
        }
        other => Err(Error::UnsupportedMediaType(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Register {
        username: String,
        password: String,
        name: String,
    }

    fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &str)]) -> Bytes {
        let mut out = String::new();
        for (name, filename, value) in parts {
            out.push_str(&format!("--{boundary}\r\n"));
            match filename {
                Some(f) => out.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\r\n"
                )),
                None => {
                    out.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"))
                }
            }
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str(&format!("--{boundary}--\r\n"));
        Bytes::from(out)
    }

    #[tokio::test]
    async fn json_body() {
        let body = Bytes::from(r#"{"username":"hanafi","password":"adhi","name":"Hanafi Adhi"}"#);
        let parsed: Register = parse_into(Some("application/json"), &body).await.unwrap();
        assert_eq!(parsed.name, "Hanafi Adhi");
    }

    #[tokio::test]
    async fn urlencoded_body() {
        let body = Bytes::from("username=hanafi&password=adhi&name=Hanafi+Adhi");
        let parsed: Register = parse_into(Some("application/x-www-form-urlencoded"), &body)
            .await
            .unwrap();
        assert_eq!(parsed.name, "Hanafi Adhi");
    }

    #[tokio::test]
    async fn json_and_form_populate_identically() {
        let json = Bytes::from(r#"{"username":"hanafi","password":"adhi","name":"Hanafi Adhi"}"#);
        let form = Bytes::from("username=hanafi&password=adhi&name=Hanafi+Adhi");
        let a: Register = parse_into(Some("application/json"), &json).await.unwrap();
        let b: Register = parse_into(Some("application/x-www-form-urlencoded"), &form)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn multipart_text_fields() {
        let boundary = "XBOUNDARY";
        let body = multipart_body(
            boundary,
            &[
                ("username", None, "hanafi"),
                ("password", None, "adhi"),
                ("name", None, "Hanafi Adhi"),
            ],
        );
        let content_type = format!("multipart/form-data; boundary={boundary}");
        let parsed: Register = parse_into(Some(&content_type), &body).await.unwrap();
        assert_eq!(parsed.username, "hanafi");
        assert_eq!(parsed.name, "Hanafi Adhi");
    }

    #[tokio::test]
    async fn multipart_file_extraction() {
        let boundary = "XBOUNDARY";
        let body = multipart_body(
            boundary,
            &[("image", Some("jalan-jalan.jpeg"), "fake image bytes")],
        );
        let content_type = format!("multipart/form-data; boundary={boundary}");
        let (fields, files) = parse_multipart(&content_type, body).await.unwrap();
        assert!(fields.is_empty());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].field(), "image");
        assert_eq!(files[0].filename(), "jalan-jalan.jpeg");
        assert_eq!(files[0].bytes().as_ref(), b"fake image bytes");
    }

    #[tokio::test]
    async fn unsupported_media_type() {
        let body = Bytes::from("whatever");
        let err = parse_into::<Register>(Some("text/plain"), &body)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType(t) if t == "text/plain"));
    }

    #[tokio::test]
    async fn missing_content_type() {
        let body = Bytes::from("whatever");
        let err = parse_into::<Register>(None, &body).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn malformed_json_is_decode_error() {
        let body = Bytes::from("{not json");
        let err = parse_into::<Register>(Some("application/json"), &body)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn uploaded_file_save() {
        let dir = tempfile::tempdir().unwrap();
        let file = UploadedFile {
            field: "image".into(),
            filename: "a.bin".into(),
            bytes: Bytes::from_static(b"abc"),
        };
        let path = dir.path().join("a.bin");
        file.save(&path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }
}
