//! Concrete migration operations: git for content, the GitHub API for the destination.

pub mod git;
pub mod github;

use crate::config::Config;
use crate::entity::Entity;
use crate::orchestrator::{DestinationStatus, LocalHandle, MigrationOps, OpResult, TransferOutcome};
use anyhow::Result;
use async_trait::async_trait;

pub use git::GitClient;
pub use github::GitHubClient;

/// Migrates repositories into one GitHub organization.
pub struct RepositoryOps {
    git: GitClient,
    github: GitHubClient,
    org: String,
    git_url: String,
    private: bool,
}

impl RepositoryOps {
    pub fn new(git: GitClient, github: GitHubClient, org: impl Into<String>, git_url: impl Into<String>, private: bool) -> Self {
        Self {
            git,
            github,
            org: org.into(),
            git_url: git_url.into().trim_end_matches('/').to_string(),
            private,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let org = config.org()?;
        let token = config.github_token();
        let destination = &config.toml.destination;
        Ok(Self::new(
            GitClient::new(config.git_cmd(), config.work_dir.clone(), token.clone()),
            GitHubClient::new(destination.api_url.clone(), token),
            org,
            destination.git_url.clone(),
            destination.private,
        ))
    }

    pub fn org(&self) -> &str {
        &self.org
    }
}

#[async_trait]
impl MigrationOps for RepositoryOps {
    async fn check_destination(&self, entity: &Entity) -> OpResult<DestinationStatus> {
        let Some(repo) = self.github.get_repo(&self.org, &entity.name).await? else {
            return Ok(DestinationStatus::missing());
        };
        let is_empty = self.github.is_empty(&self.org, &entity.name).await?;
        Ok(DestinationStatus::existing(is_empty, repo.clone_url))
    }

    async fn fetch_source(&self, entity: &Entity) -> OpResult<LocalHandle> {
        let path = self.git.mirror(&entity.source_address, &entity.name).await?;
        Ok(LocalHandle::new(path))
    }

    async fn create_destination(&self, entity: &Entity) -> OpResult<String> {
        let repo = self
            .github
            .create_repo(&self.org, &entity.name, &entity.description, self.private)
            .await?;
        Ok(repo.clone_url)
    }

    async fn update_metadata(&self, entity: &Entity) -> OpResult<()> {
        self.github
            .update_repo(&self.org, &entity.name, &entity.description, self.private)
            .await?;
        Ok(())
    }

    async fn transfer_content(
        &self,
        handle: &LocalHandle,
        destination_address: &str,
    ) -> OpResult<TransferOutcome> {
        let warnings = self.git.push_mirror(&handle.path, destination_address).await?;
        Ok(TransferOutcome { warnings })
    }

    async fn verify_final(
        &self,
        handle: &LocalHandle,
        destination_address: &str,
        _entity: &Entity,
    ) -> OpResult<()> {
        self.git.verify(&handle.path, destination_address).await?;
        Ok(())
    }

    async fn cleanup(&self, handle: &LocalHandle) -> OpResult<()> {
        self.git.remove_mirror(&handle.path).await?;
        Ok(())
    }

    fn local_handle(&self, entity: &Entity) -> LocalHandle {
        LocalHandle::new(self.git.mirror_path(&entity.name))
    }

    fn destination_address(&self, entity: &Entity) -> String {
        format!("{}/{}/{}.git", self.git_url, self.org, entity.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ops() -> RepositoryOps {
        RepositoryOps::new(
            GitClient::new("git", "/var/lib/migrator/work", None),
            GitHubClient::new("https://api.github.com", None),
            "acme",
            "https://github.com/",
            true,
        )
    }

    #[test]
    fn test_destination_address() {
        let entity = Entity::new("svc", "", "https://git.example.com/svc.git");
        assert_eq!(ops().destination_address(&entity), "https://github.com/acme/svc.git");
    }

    #[test]
    fn test_local_handle_is_the_mirror_path() {
        let entity = Entity::new("svc", "", "https://git.example.com/svc.git");
        assert_eq!(
            ops().local_handle(&entity).path,
            PathBuf::from("/var/lib/migrator/work/svc.git")
        );
    }

    #[tokio::test]
    async fn test_cleanup_of_missing_mirror_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let ops = RepositoryOps::new(
            GitClient::new("git", dir.path(), None),
            GitHubClient::new("https://api.github.com", None),
            "acme",
            "https://github.com",
            true,
        );
        let handle = LocalHandle::new(dir.path().join("never-fetched.git"));
        ops.cleanup(&handle).await.unwrap();
    }
}
