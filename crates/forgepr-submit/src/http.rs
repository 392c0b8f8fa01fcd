// http.rs — Authenticated HTTP session shared by the REST providers.
//
// One HttpSession is created per provider at setup and owns the reqwest
// client, the API base URL and the bearer credential. The credential is
// forwarded verbatim as `Authorization: Bearer <token>`; nothing here
// interprets it.
//
// Status handling is uniform: 2xx succeeds, everything else becomes an
// UpstreamError carrying the method, path, status and the provider's error
// message. Callers decide which statuses are benign (usually 404).

use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::{SubmitError, UpstreamError};

const MAX_MESSAGE_LEN: usize = 500;

/// Authenticated session against one provider API.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    api_base: Url,
    token: String,
}

impl HttpSession {
    /// Create a session for `api_base` with a fresh reqwest client.
    pub fn new(api_base: &str, token: &str) -> Result<Self, SubmitError> {
        Self::with_client(Client::new(), api_base, token)
    }

    /// Create a session with a custom reqwest client.
    pub fn with_client(client: Client, api_base: &str, token: &str) -> Result<Self, SubmitError> {
        if token.trim().is_empty() {
            return Err(SubmitError::SetupFailed(
                "missing authentication token".to_string(),
            ));
        }
        let api_base = Url::parse(api_base).map_err(|e| {
            SubmitError::SetupFailed(format!("invalid API base URL '{}': {}", api_base, e))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(SubmitError::SetupFailed(format!(
                "API base URL '{}' cannot carry a path",
                api_base
            )));
        }
        Ok(Self {
            client,
            api_base,
            token: token.trim().to_string(),
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Append path segments to the API base. Each segment is percent-encoded
    /// on its own, so a `/` inside a segment becomes `%2F`.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Like [`endpoint`](Self::endpoint), followed by a slash-separated file
    /// path whose separators are kept.
    pub fn endpoint_with_path(&self, segments: &[&str], file_path: &str) -> Url {
        let mut url = self.endpoint(segments);
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(file_path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    /// Start a request with authentication and client identification set.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request_accepting(method, url, "application/json")
    }

    /// Like [`request`](Self::request) with a custom `Accept` media type.
    pub fn request_accepting(&self, method: Method, url: Url, accept: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(USER_AGENT, concat!("forgepr/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, accept)
    }

    /// Send a request; non-2xx statuses become `UpstreamError`.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, UpstreamError> {
        let request = builder
            .build()
            .map_err(|e| UpstreamError::transport("build request", e))?;
        let operation = format!("{} {}", request.method(), request.url().path());
        tracing::debug!("http: {}", operation);

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| UpstreamError::transport(&operation, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::new(
            operation,
            Some(status.as_u16()),
            extract_message(&body),
        ))
    }

    /// Send and decode a JSON body.
    pub async fn json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, UpstreamError> {
        let response = self.send(builder).await?;
        decode_json(response).await
    }

    /// Send and decode a JSON body; a 404 becomes `Ok(None)`.
    pub async fn optional_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<Option<T>, UpstreamError> {
        match self.send(builder).await {
            Ok(response) => decode_json(response).await.map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Send and read the body as text; a 404 becomes `Ok(None)`.
    pub async fn optional_text(
        &self,
        builder: RequestBuilder,
    ) -> Result<Option<String>, UpstreamError> {
        match self.send(builder).await {
            Ok(response) => {
                let url = response.url().path().to_string();
                response
                    .text()
                    .await
                    .map(Some)
                    .map_err(|e| UpstreamError::transport(format!("read {}", url), e))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Send and discard the body.
    pub async fn empty(&self, builder: RequestBuilder) -> Result<StatusCode, UpstreamError> {
        let response = self.send(builder).await?;
        Ok(response.status())
    }

    /// GET a JSON array and follow `Link: <…>; rel="next"` until exhausted.
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        first: Url,
    ) -> Result<Vec<T>, UpstreamError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let response = self.send(self.request(Method::GET, url)).await?;
            next = next_link(response.headers()).and_then(|link| Url::parse(&link).ok());
            let mut page: Vec<T> = decode_json(response).await?;
            tracing::debug!(
                "http: page with {} item(s), more pages: {}",
                page.len(),
                next.is_some()
            );
            items.append(&mut page);
        }
        Ok(items)
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, UpstreamError> {
    let operation = format!("decode {}", response.url().path());
    response
        .json::<T>()
        .await
        .map_err(|e| UpstreamError::transport(operation, e))
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|part| {
            let mut pieces = part.split(';');
            let target = pieces.next()?.trim();
            let is_next = pieces.any(|param| {
                let param = param.trim().replace(' ', "");
                param == "rel=\"next\"" || param == "rel=next"
            });
            if !is_next {
                return None;
            }
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        })
}

/// Pull a human-readable message out of a provider error body.
///
/// Understands `{"message": …}` (GitHub, GitLab), GitHub's `errors[]`
/// details and Bitbucket's `{"error": {"message": …}}`. Falls back to the
/// raw body, truncated.
pub fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let mut parts = Vec::new();
        match value.get("message") {
            Some(serde_json::Value::String(s)) => parts.push(s.clone()),
            Some(other) => parts.push(other.to_string()),
            None => {}
        }
        if let Some(errors) = value.get("errors").and_then(|e| e.as_array()) {
            for error in errors {
                if let Some(msg) = error.get("message").and_then(|m| m.as_str()) {
                    parts.push(msg.to_string());
                }
            }
        }
        if let Some(msg) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            parts.push(msg.to_string());
        }
        if let Some(s) = value.get("error").and_then(|e| e.as_str()) {
            parts.push(s.to_string());
        }
        if !parts.is_empty() {
            return parts.join("; ");
        }
    }
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn session(base: &str) -> HttpSession {
        HttpSession::new(base, "t0ken").unwrap()
    }

    #[test]
    fn empty_token_is_setup_failure() {
        let err = HttpSession::new("https://api.github.com", "  ").unwrap_err();
        assert!(matches!(err, SubmitError::SetupFailed(_)));
    }

    #[test]
    fn invalid_base_is_setup_failure() {
        let err = HttpSession::new("not a url", "t").unwrap_err();
        assert!(matches!(err, SubmitError::SetupFailed(_)));
    }

    #[test]
    fn endpoint_encodes_each_segment() {
        let s = session("https://gitlab.example.com/api/v4/");
        let url = s.endpoint(&["projects", "group/sub/proj", "repository", "branches", "feat/x"]);
        assert_eq!(
            url.as_str(),
            "https://gitlab.example.com/api/v4/projects/group%2Fsub%2Fproj/repository/branches/feat%2Fx"
        );
    }

    #[test]
    fn endpoint_with_path_keeps_separators() {
        let s = session("https://api.github.com");
        let url = s.endpoint_with_path(&["repos", "acme", "widgets", "contents"], "deploy/app.yaml");
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/widgets/contents/deploy/app.yaml"
        );
    }

    #[test]
    fn next_link_finds_rel_next() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://api.example.com/items?page=3>; rel=\"next\", <https://api.example.com/items?page=9>; rel=\"last\"",
            ),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://api.example.com/items?page=3")
        );
    }

    #[test]
    fn next_link_absent_on_last_page() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static("<https://api.example.com/items?page=1>; rel=\"first\""),
        );
        assert_eq!(next_link(&headers), None);
    }

    #[test]
    fn extract_message_reads_provider_shapes() {
        assert_eq!(
            extract_message(r#"{"message":"Validation Failed","errors":[{"message":"A pull request already exists for acme:feat."}]}"#),
            "Validation Failed; A pull request already exists for acme:feat."
        );
        assert_eq!(
            extract_message(r#"{"message":["Another open merge request already exists for this source branch: !4"]}"#),
            r#"["Another open merge request already exists for this source branch: !4"]"#
        );
        assert_eq!(
            extract_message(r#"{"type":"error","error":{"message":"Branch already exists"}}"#),
            "Branch already exists"
        );
        assert_eq!(extract_message("  plain text  "), "plain text");
    }
}
