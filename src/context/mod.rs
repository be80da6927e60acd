//! Per-request context — everything a handler can read from the request and
//! the helpers it uses to build a response.
//!
//! A [`Context`] is created once per dispatch, owned exclusively by that
//! request's handler chain, and dropped when the response is produced. It
//! carries the parsed request, the path parameters extracted by the router,
//! and the cookies parsed from the `Cookie` header.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::body::{self, UploadedFile};
use crate::error::Error;
use crate::http::request::{decode_component, parse_urlencoded};
use crate::http::{Request, Response, StatusCode};

/// Path parameters extracted from the matched route pattern.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a parameter name to its runtime value.
    pub fn insert(&mut self, name: String, value: String) {
        self.map.insert(name, value);
    }

    /// Returns the value bound to `name`, if the matched pattern had such a segment.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }
}

/// Per-request state passed through the middleware chain to the handler.
pub struct Context {
    request: Request,
    params: PathParams,
    cookies: HashMap<String, String>,
}

impl Context {
    /// Creates a context for a request that matched no parameterized pattern.
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    /// Creates a context carrying the path parameters the router extracted.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        let cookies = parse_cookies(request.headers().get("cookie").unwrap_or(""));
        Self {
            request,
            params,
            cookies,
        }
    }

    /// The underlying parsed request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The path parameters extracted by the router.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Returns the path parameter bound to `name`, or `""` if the matched
    /// pattern had no such segment.
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).unwrap_or("")
    }

    /// Returns the query parameter `name`, or `default` when absent or empty.
    ///
    /// A key given with no value (`?name=`) counts as absent.
    ///
    /// # Examples
    ///
    /// ```
    /// # use skiff::{Context, http::Request};
    /// let raw = b"GET /hello?name=Hanafi HTTP/1.1\r\nHost: x\r\n\r\n";
    /// let (request, _) = Request::parse(raw).unwrap();
    /// let ctx = Context::new(request);
    /// assert_eq!(ctx.query("name", "Guest"), "Hanafi");
    /// assert_eq!(ctx.query("missing", "Guest"), "Guest");
    /// ```
    pub fn query<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.request
            .query_param(name)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }

    /// Returns the first value of the request header `name`, or `""` when absent.
    pub fn header(&self, name: &str) -> &str {
        self.request.headers().get(name).unwrap_or("")
    }

    /// Returns the cookie `name` from the `Cookie` request header, or `""` when absent.
    pub fn cookie(&self, name: &str) -> &str {
        self.cookies.get(name).map(String::as_str).unwrap_or("")
    }

    /// Returns the raw request body bytes.
    pub fn body(&self) -> &bytes::Bytes {
        self.request.body()
    }

    /// Deserializes the raw body as JSON, regardless of `Content-Type`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(self.request.body())?)
    }

    /// Decodes the body into `T` according to the request's `Content-Type`.
    ///
    /// Supports `application/json`, `application/x-www-form-urlencoded`, and
    /// the text fields of `multipart/form-data`. See [`Error`] for the
    /// failure taxonomy.
    pub async fn body_parser<T: DeserializeOwned>(&self) -> Result<T, Error> {
        body::parse_into(self.request.content_type(), self.request.body()).await
    }

    /// Returns the urlencoded form field `name` from the body, or `""` when
    /// absent or when the body is not a urlencoded form.
    pub fn form_value(&self, name: &str) -> String {
        let Ok(text) = std::str::from_utf8(self.request.body()) else {
            return String::new();
        };
        parse_urlencoded(text)
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .unwrap_or_default()
    }

    /// Extracts the file uploaded under the multipart field `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedMediaType`] — the body is not `multipart/form-data`.
    /// - [`Error::Decode`] — the multipart payload is malformed, or no file
    ///   field with that name exists.
    pub async fn form_file(&self, name: &str) -> Result<UploadedFile, Error> {
        let content_type = self
            .request
            .content_type()
            .ok_or_else(|| Error::UnsupportedMediaType("<missing>".to_owned()))?;
        if !content_type.trim_start().starts_with("multipart/form-data") {
            return Err(Error::UnsupportedMediaType(content_type.to_owned()));
        }

        let (_fields, files) =
            body::parse_multipart(content_type, self.request.body().clone()).await?;
        files
            .into_iter()
            .find(|f| f.field() == name)
            .ok_or_else(|| Error::Decode(format!("no multipart file field named {name:?}")))
    }

    /// Builds a `200 OK` plain-text response.
    pub fn send_text(&self, body: impl Into<String>) -> Result<Response, Error> {
        Ok(Response::new(StatusCode::Ok).body(body))
    }

    /// Builds a `200 OK` JSON response. Object keys serialize in sorted order.
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<Response, Error> {
        Ok(Response::json(value)?)
    }

    /// Streams the file at `path` as an attachment named `filename`.
    ///
    /// Sets `Content-Disposition: attachment; filename="..."` and guesses the
    /// content type from `filename`.
    ///
    /// # Errors
    ///
    /// [`Error::FileNotFound`] when `path` does not exist; [`Error::Io`] for
    /// other filesystem failures.
    pub async fn download(
        &self,
        path: impl AsRef<Path>,
        filename: &str,
    ) -> Result<Response, Error> {
        let path = path.as_ref();
        let contents = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_owned())
            } else {
                Error::Io(e)
            }
        })?;

        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        Ok(Response::new(StatusCode::Ok)
            .header("Content-Type", mime.essence_str())
            .header(
                "Content-Disposition",
                format!("attachment; filename=\"{filename}\""),
            )
            .body_bytes(contents))
    }
}

/// Parses a `Cookie` request header (`name=value; name2=value2`) into a map.
/// Values are percent-decoded; malformed pairs are skipped.
fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            let value = parts.next()?;
            if name.is_empty() {
                return None;
            }
            Some((name.to_owned(), decode_component(value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_context(raw: &str) -> Context {
        let (request, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(request)
    }

    #[test]
    fn query_with_default() {
        let ctx = make_context("GET /hello?name=Hanafi HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(ctx.query("name", "Guest"), "Hanafi");
        assert_eq!(ctx.query("other", "Guest"), "Guest");
    }

    #[test]
    fn empty_query_value_falls_back_to_default() {
        let ctx = make_context("GET /hello?name= HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(ctx.query("name", "Guest"), "Guest");
    }

    #[test]
    fn header_and_cookie() {
        let ctx = make_context(
            "GET /request HTTP/1.1\r\nHost: x\r\nfirstname: hanafi\r\nCookie: lastname=adhi\r\n\r\n",
        );
        assert_eq!(ctx.header("firstname"), "hanafi");
        assert_eq!(ctx.cookie("lastname"), "adhi");
        assert_eq!(ctx.header("missing"), "");
        assert_eq!(ctx.cookie("missing"), "");
    }

    #[test]
    fn multiple_cookies() {
        let ctx =
            make_context("GET / HTTP/1.1\r\nHost: x\r\nCookie: a=1; b=hello%20world; c=3\r\n\r\n");
        assert_eq!(ctx.cookie("a"), "1");
        assert_eq!(ctx.cookie("b"), "hello world");
        assert_eq!(ctx.cookie("c"), "3");
    }

    #[test]
    fn form_value_from_body() {
        let ctx = make_context(
            "POST /hello HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 11\r\n\r\nname=hanafi",
        );
        assert_eq!(ctx.form_value("name"), "hanafi");
        assert_eq!(ctx.form_value("missing"), "");
    }

    #[test]
    fn json_body() {
        let body = r#"{"username":"hanafi","password":"adhi"}"#;
        let ctx = make_context(&format!(
            "POST /login HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ));
        let value: serde_json::Value = ctx.json().unwrap();
        assert_eq!(value["username"], "hanafi");
    }

    #[test]
    fn param_defaults_to_empty() {
        let mut params = PathParams::new();
        params.insert("userId".into(), "hanafi".into());
        let (request, _) =
            Request::parse(b"GET /user/hanafi HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        let ctx = Context::with_params(request, params);
        assert_eq!(ctx.param("userId"), "hanafi");
        assert_eq!(ctx.param("orderId"), "");
    }

    #[tokio::test]
    async fn download_missing_file() {
        let ctx = make_context("GET /download HTTP/1.1\r\nHost: x\r\n\r\n");
        let err = ctx
            .download("/definitely/not/here.txt", "contoh.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[tokio::test]
    async fn download_sets_disposition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dahlah.txt");
        std::fs::write(&path, "bismillah\n").unwrap();

        let ctx = make_context("GET /download HTTP/1.1\r\nHost: x\r\n\r\n");
        let res = ctx.download(&path, "contoh.txt").await.unwrap();
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(
            res.headers().get("content-disposition"),
            Some("attachment; filename=\"contoh.txt\"")
        );
        assert_eq!(res.headers().get("content-type"), Some("text/plain"));
        assert_eq!(res.body_ref(), b"bismillah\n");
    }
}
