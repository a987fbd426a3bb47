use async_trait::async_trait;
use chrono::Utc;
use medikeep_scheduler::{BackupArtifact, BackupJob};

use crate::export::ExportClient;
use crate::github::GithubUploader;

/// The job the scheduler fires: export clinic records, then push the payload
/// to GitHub. Either step failing fails the attempt; retry policy beyond the
/// export client's single transport retry belongs to the caller.
pub struct BackupPipeline {
    export: ExportClient,
    uploader: GithubUploader,
}

impl BackupPipeline {
    pub fn new(export: ExportClient, uploader: GithubUploader) -> Self {
        Self { export, uploader }
    }
}

#[async_trait]
impl BackupJob for BackupPipeline {
    async fn run(&self) -> anyhow::Result<BackupArtifact> {
        let payload = self.export.export().await?;
        let artifact = self.uploader.upload(&payload, Utc::now()).await?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medikeep_core::config::{ClinicConfig, GithubConfig};
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pipeline_against(server: &MockServer) -> BackupPipeline {
        let clinic = ClinicConfig {
            base_url: format!("{}/api", server.uri()),
            token: None,
            resources: vec!["patients".into()],
        };
        let github = GithubConfig {
            owner: "clinic-org".into(),
            repo: "backups".into(),
            token: "ghp_x".into(),
            branch: "main".into(),
            dir: "daily".into(),
        };
        BackupPipeline::new(
            ExportClient::new(&clinic).unwrap(),
            GithubUploader::new(&github)
                .unwrap()
                .with_api_base(&server.uri()),
        )
    }

    #[tokio::test]
    async fn export_then_upload_yields_an_artifact() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/patients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/repos/clinic-org/backups/contents/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "content": {
                    "name": "backup-20260823-230000.json",
                    "size": 64,
                    "download_url": "https://raw.githubusercontent.com/x"
                }
            })))
            .mount(&server)
            .await;

        let artifact = pipeline_against(&server).run().await.unwrap();
        assert_eq!(artifact.size, 64);
    }

    #[tokio::test]
    async fn export_failure_aborts_before_upload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/patients"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let err = pipeline_against(&server).run().await.unwrap_err();
        assert!(err.to_string().contains("clinic API returned"));
    }
}
