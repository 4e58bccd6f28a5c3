use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::errors::Result;

/// One field of a multipart upload, owned so the form can be rebuilt
#[derive(Debug, Clone)]
pub enum UploadPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<UploadPart>),
}

/// A rebuildable API call.
///
/// Requests that hit an expired access token are replayed after the refresh,
/// so the description must outlive the first `reqwest::Request`.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn multipart(mut self, parts: Vec<UploadPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Build a fresh `reqwest` request, attaching `access_token` as bearer if given
    pub(crate) fn build(&self, http: &Client, url: Url, access_token: Option<&str>) -> Result<RequestBuilder> {
        let mut builder = http.request(self.method.clone(), url);
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        builder = match &self.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };
        Ok(builder)
    }
}

fn build_form(parts: &[UploadPart]) -> Result<Form> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            UploadPart::Text { name, value } => form.text(name.clone(), value.clone()),
            UploadPart::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file.mime_str(mime)?;
                }
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_request_carries_bearer_and_json() {
        let http = Client::new();
        let request = ApiRequest::post("/api/Users/follow/")
            .json(&serde_json::json!({ "followed": 3 }))
            .unwrap()
            .query("page", "2");

        let built = request
            .build(&http, Url::parse("http://localhost/api/Users/follow/").unwrap(), Some("tok"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(built.method(), Method::POST);
        assert_eq!(built.url().query(), Some("page=2"));
        assert_eq!(
            built.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn no_token_means_no_authorization_header() {
        let http = Client::new();
        let built = ApiRequest::get("/x")
            .build(&http, Url::parse("http://localhost/x").unwrap(), None)
            .unwrap()
            .build()
            .unwrap();
        assert!(built.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn multipart_can_be_rebuilt() {
        let http = Client::new();
        let request = ApiRequest::post("/upload").multipart(vec![
            UploadPart::Text {
                name: "title".to_string(),
                value: "Lisbon".to_string(),
            },
            UploadPart::File {
                name: "media_files".to_string(),
                file_name: "tram.jpg".to_string(),
                mime: Some("image/jpeg".to_string()),
                bytes: vec![0xFF, 0xD8],
            },
        ]);
        let url = Url::parse("http://localhost/upload").unwrap();

        for _ in 0..2 {
            let built = request.build(&http, url.clone(), Some("t")).unwrap().build().unwrap();
            let content_type = built.headers().get(reqwest::header::CONTENT_TYPE).unwrap();
            assert!(content_type.to_str().unwrap().starts_with("multipart/form-data"));
        }
    }
}
