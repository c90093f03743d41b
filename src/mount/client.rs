//! HTTP access to a running gateway.
//!
//! Supplies the snapshots a mount context is built from (entities and object
//! listings) and acts as its download capability.

use crate::{
    models::{entity::Entity, listing::ObjectListing, specification::ObjectSpecification},
    mount::{DownloadUrlSource, MountError},
    services::url_signer::uri_encode_segment,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl GatewayClient {
    pub fn new(http: reqwest::Client, base_url: &str, access_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, MountError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "gateway request");

        let mut request = self.http.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let http_err = |source| MountError::Http {
            url: url.clone(),
            source,
        };

        let response = request.send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MountError::Status {
                url: url.clone(),
                status,
            });
        }
        response.json::<T>().await.map_err(http_err)
    }

    pub async fn find_entities(&self) -> Result<Vec<Entity>, MountError> {
        self.get_json("/entities").await
    }

    pub async fn list_objects(&self) -> Result<Vec<ObjectListing>, MountError> {
        self.get_json("/listing").await
    }

    pub async fn download(
        &self,
        object_id: &str,
        offset: i64,
        length: i64,
        for_external_use: bool,
    ) -> Result<ObjectSpecification, MountError> {
        self.get_json(&download_path(object_id, offset, length, for_external_use))
            .await
    }
}

#[async_trait]
impl DownloadUrlSource for GatewayClient {
    async fn get_url(&self, object_id: &str) -> Result<String, MountError> {
        let spec = self.download(object_id, 0, -1, true).await?;
        spec.parts
            .into_iter()
            .next()
            .and_then(|part| part.url)
            .ok_or_else(|| MountError::MissingUrl(object_id.to_string()))
    }
}

fn download_path(object_id: &str, offset: i64, length: i64, for_external_use: bool) -> String {
    format!(
        "/download/{}?offset={}&length={}&external={}",
        uri_encode_segment(object_id),
        offset,
        length,
        for_external_use
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_escaped_in_download_paths() {
        assert_eq!(
            download_path("plain-id", 0, -1, true),
            "/download/plain-id?offset=0&length=-1&external=true"
        );
        assert_eq!(
            download_path("a/b?c", 5, 10, false),
            "/download/a%2Fb%3Fc?offset=5&length=10&external=false"
        );
    }
}
