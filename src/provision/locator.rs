//! Resource locator: the "get" half of get-or-create.
//!
//! A resource is identified by its `Name` tag plus, for some kinds, an extra
//! filter (a VPC must also carry the configured address block, an instance
//! must not be terminated). The locator returns the first matching ID or
//! `None`; the caller decides whether to create.

use crate::cloud::{Ec2Api, ResourceFilter, ResourceKind};
use crate::config::Config;
use crate::error::Result;

/// Looks up resources by tag through an [`Ec2Api`].
pub struct Locator<'a, P: Ec2Api + ?Sized> {
    provider: &'a P,
}

impl<'a, P: Ec2Api + ?Sized> Locator<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Type-specific filters that accompany the tag filter.
    pub fn identity_filters(kind: ResourceKind, config: &Config) -> Vec<ResourceFilter> {
        match kind {
            ResourceKind::Vpc => vec![ResourceFilter::cidr_block(&config.network.vpc_cidr)],
            ResourceKind::Instance => vec![ResourceFilter::live_instances()],
            _ => Vec::new(),
        }
    }

    /// IDs of every resource of `kind` tagged `name` that also matches `extra`.
    pub async fn find_all(
        &self,
        kind: ResourceKind,
        name: &str,
        extra: &[ResourceFilter],
    ) -> Result<Vec<String>> {
        let mut filters = Vec::with_capacity(extra.len() + 1);
        filters.push(ResourceFilter::name_tag(name));
        filters.extend_from_slice(extra);

        tracing::debug!(%kind, name, ?filters, "Searching for existing resource");

        self.provider.describe(kind, &filters).await.map_err(|e| {
            tracing::error!(%kind, name, error = %e, "Failed while searching for existing {}", kind);
            e
        })
    }

    /// First resource of `kind` tagged `name`, if any.
    pub async fn locate(
        &self,
        kind: ResourceKind,
        name: &str,
        extra: &[ResourceFilter],
    ) -> Result<Option<String>> {
        let mut ids = self.find_all(kind, name, extra).await?;

        if ids.len() > 1 {
            tracing::warn!(
                %kind,
                name,
                count = ids.len(),
                "Tag matches more than one {}; using the first",
                kind
            );
        }

        if ids.is_empty() {
            tracing::debug!(%kind, name, "No existing {} found", kind);
            return Ok(None);
        }

        let id = ids.swap_remove(0);
        tracing::info!(%kind, name, id = %id, "Custom {} exists", kind);
        Ok(Some(id))
    }
}
