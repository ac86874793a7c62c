use super::{Request, Response, Transport, TransportError};
use reqwest::{Client, Url};

/// [`Transport`] over HTTP/1.1 with JSON bodies, backed by a pooled `reqwest` client.
///
/// Request paths are resolved against the origin given at construction, so
/// `HttpTransport::new("http://localhost:8080")` sends `/team/add` to
/// `http://localhost:8080/team/add`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| TransportError::Request(format!("invalid base url `{base_url}`: {err}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let url = self
            .base_url
            .join(request.path)
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let res = self
            .client
            .post(url)
            .json(&request.body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|err| classify(err, request))?;
        let status = res.status().as_u16();

        // NOTE: Drain the body so the connection goes back to the pool.
        res.bytes().await.map_err(|err| classify(err, request))?;

        Ok(Response { status })
    }
}

fn classify(err: reqwest::Error, request: &Request) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(request.timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}
