//! reqwest adapter for the feed API.
//!
//! Serves every [`ResourceKey`] as a [`Resource`] and performs post and
//! comment writes. Timeouts surface as ordinary transport failures.

use async_trait::async_trait;
use chirp_api_types::{BodyRequest, PostRecord, UserRecord};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::application::submission::{WriteError, WriteRequest, WriteTarget, Writer};
use crate::cache::{FetchError, Fetcher, ResourceKey};
use crate::config::ApiSettings;
use crate::domain::identity::Identity;
use crate::domain::resources::Resource;

use super::error::InfraError;

#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    base: Url,
}

impl HttpClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let mut base = settings.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| InfraError::http(format!("failed to build client: {err}")))?;

        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("chirp/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `segments` are percent-encoded, so ids cannot escape their path slot.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, InfraError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| InfraError::http(format!("base url `{}` cannot hold a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        identity: Option<&Identity>,
    ) -> Result<T, FetchError> {
        let url = self.url(segments, query).map_err(FetchError::transport)?;

        let mut request = self.client.get(url);
        if let Some(identity) = identity {
            request = request.bearer_auth(identity.token());
        }

        let response = request.send().await.map_err(FetchError::transport)?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(FetchError::transport)?;
        serde_json::from_slice(&bytes).map_err(FetchError::decode)
    }

    async fn current_user(&self, identity: Option<&Identity>) -> Result<Resource, FetchError> {
        let Some(identity) = identity else {
            return Ok(Resource::CurrentUser(None));
        };

        match self
            .get_json::<UserRecord>(&["api", "current"], &[], Some(identity))
            .await
        {
            Ok(user) => Ok(Resource::CurrentUser(Some(user))),
            Err(FetchError::Status { status }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                debug!(user_id = %identity.user_id(), "Session rejected; treating as signed out");
                Ok(Resource::CurrentUser(None))
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Fetcher<Resource> for HttpClient {
    #[instrument(skip(self, identity), fields(key = %key))]
    async fn fetch(
        &self,
        key: &ResourceKey,
        identity: Option<&Identity>,
    ) -> Result<Resource, FetchError> {
        match key {
            ResourceKey::CurrentUser => self.current_user(identity).await,
            ResourceKey::PostList => self
                .get_json::<Vec<PostRecord>>(&["api", "posts"], &[], identity)
                .await
                .map(Resource::Posts),
            ResourceKey::UserPosts(user_id) => self
                .get_json::<Vec<PostRecord>>(
                    &["api", "posts"],
                    &[("userId", user_id.as_str())],
                    identity,
                )
                .await
                .map(Resource::Posts),
            ResourceKey::Post(post_id) => self
                .get_json::<PostRecord>(&["api", "posts", post_id.as_str()], &[], identity)
                .await
                .map(Resource::Post),
            ResourceKey::User(user_id) => self
                .get_json::<UserRecord>(&["api", "users", user_id.as_str()], &[], identity)
                .await
                .map(Resource::User),
        }
    }
}

#[async_trait]
impl Writer for HttpClient {
    #[instrument(skip(self, request, identity), fields(target = %request.target))]
    async fn write(&self, request: &WriteRequest, identity: &Identity) -> Result<(), WriteError> {
        let url = match &request.target {
            WriteTarget::Post => self.url(&["api", "posts"], &[]),
            WriteTarget::Comment { post_id } => {
                self.url(&["api", "comments"], &[("postId", post_id.as_str())])
            }
        }
        .map_err(WriteError::transport)?;

        let body = BodyRequest {
            body: request.body.clone(),
        };
        let response = self
            .client
            .post(url)
            .bearer_auth(identity.token())
            .json(&body)
            .send()
            .await
            .map_err(WriteError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(WriteError::Rejected {
                status: status.as_u16(),
            });
        }
        debug!(status = status.as_u16(), "Write accepted");
        Ok(())
    }
}
