//! Toaster operations.
//!
//! Creating or updating a toaster ships its code in one of several ways, see
//! [`CodeSource`]. Folder and stream sources go through the multipart
//! upload; the remaining settings then travel as the form's `request` field.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::apiclient::{Access, UploadMethod};
use crate::contract::ResponseBody;
use crate::error::ToastateError;
use crate::models::{base64_bytes, Toaster, ToasterStats};
use crate::session::{require_id, Session};
use crate::upload::UploadQueue;

/// Credentials and location of a git repository holding the code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitSource {
    pub url: String,
    pub username: String,
    pub access_token: String,
    pub password: String,
    pub branch: String,
}

/// Where the code of a toaster comes from.
#[derive(Debug, Default)]
pub enum CodeSource {
    /// Keep the current code (update) or deploy none (create).
    #[default]
    None,
    /// Files held in memory: `codes[i]` is the content of `code_paths[i]`.
    Inline {
        codes: Vec<Vec<u8>>,
        code_paths: Vec<String>,
    },
    Git(GitSource),
    /// Every file below a local directory, streamed.
    Folder(PathBuf),
    /// Files pushed through an upload queue while the request runs.
    Stream(UploadQueue),
}

#[derive(Debug, Default)]
pub struct CreateToasterInput {
    pub code: CodeSource,
    pub crypto_secure: bool,
    pub build_cmd: Vec<String>,
    pub exe_cmd: Vec<String>,
    pub env: Vec<String>,
    pub joinable_for_secs: i64,
    pub max_concurrent_joiners: i64,
    pub timeout_secs: i64,
    pub name: String,
    pub readme: String,
    pub keywords: Vec<String>,
}

/// Only the fields that are set are changed.
#[derive(Debug, Default)]
pub struct UpdateToasterInput {
    pub code: CodeSource,
    /// Rebuild from the git repository used last time.
    pub git_refresh: bool,
    pub build_cmd: Vec<String>,
    pub exe_cmd: Vec<String>,
    pub env: Vec<String>,
    pub joinable_for_secs: Option<i64>,
    pub max_concurrent_joiners: Option<i64>,
    pub timeout_secs: Option<i64>,
    pub name: Option<String>,
    pub readme: Option<String>,
    pub keywords: Vec<String>,
}

/// Result of a create or update: the toaster and its build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToasterDeployment {
    pub toaster: Toaster,
    pub domain: String,
    pub build_logs: Vec<u8>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn non_zero(value: i64) -> Option<i64> {
    (value != 0).then_some(value)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Default, Serialize)]
struct ToasterRequest {
    #[serde(rename = "cryptographically_secure", skip_serializing_if = "is_false")]
    crypto_secure: bool,

    #[serde(with = "base64_bytes::list", skip_serializing_if = "Vec::is_empty")]
    codes: Vec<Vec<u8>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    code_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    git_branch: Option<String>,
    #[serde(rename = "refresh_from_last_git", skip_serializing_if = "is_false")]
    git_refresh: bool,

    #[serde(rename = "build_command", skip_serializing_if = "Vec::is_empty")]
    build_cmd: Vec<String>,
    #[serde(rename = "execution_command", skip_serializing_if = "Vec::is_empty")]
    exe_cmd: Vec<String>,
    #[serde(rename = "environment_variables", skip_serializing_if = "Vec::is_empty")]
    env: Vec<String>,

    #[serde(rename = "joinable_for_seconds", skip_serializing_if = "Option::is_none")]
    joinable_for_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_concurrent_joiners: Option<i64>,
    #[serde(rename = "timeout_seconds", skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    readme: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    keywords: Vec<String>,
}

#[derive(Deserialize)]
struct DeploymentResponse {
    #[serde(default)]
    toaster: Option<Toaster>,
    #[serde(default)]
    domain: String,
    #[serde(default, with = "base64_bytes")]
    build_logs: Vec<u8>,
}

impl DeploymentResponse {
    fn into_deployment(self) -> Result<ToasterDeployment, ToastateError> {
        Ok(ToasterDeployment {
            toaster: self.toaster.ok_or(ToastateError::EmptyResponse("toaster"))?,
            domain: self.domain,
            build_logs: self.build_logs,
        })
    }
}

#[derive(Deserialize)]
struct CountResponse {
    #[serde(default)]
    running: i64,
}

#[derive(Deserialize)]
struct StatsResponse {
    #[serde(default)]
    stats: Option<ToasterStats>,
}

#[derive(Deserialize)]
struct ToasterResponse {
    #[serde(default)]
    toaster: Option<Toaster>,
}

#[derive(Deserialize)]
struct FilesResponse {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Deserialize)]
struct LogsResponse {
    #[serde(default, with = "base64_bytes")]
    logs: Vec<u8>,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    toasters: Vec<Toaster>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    toaster_ids: &'a [String],
}

#[derive(Deserialize)]
struct Acknowledged {}

impl Session {
    /// Number of running instances of a toaster.
    pub async fn toaster_count(&self, id: &str) -> Result<i64, ToastateError> {
        require_id(id, "ID of the Toaster")?;
        let resp: CountResponse = self
            .client
            .get(Access::Authenticated, &format!("/toaster/count/{id}"))
            .await?;
        Ok(resp.running)
    }

    pub async fn toaster_stats(&self, id: &str) -> Result<ToasterStats, ToastateError> {
        require_id(id, "ID of the Toaster")?;
        let resp: StatsResponse = self
            .client
            .get(Access::Authenticated, &format!("/toaster/stats/{id}"))
            .await?;
        resp.stats.ok_or(ToastateError::EmptyResponse("stats"))
    }

    pub async fn get_toaster(&self, id: &str) -> Result<Toaster, ToastateError> {
        require_id(id, "ID of the Toaster to get")?;
        let resp: ToasterResponse = self
            .client
            .get(Access::Authenticated, &format!("/toaster/{id}"))
            .await?;
        resp.toaster.ok_or(ToastateError::EmptyResponse("toaster"))
    }

    /// Stream one file of a toaster's code. `path` is relative to the code
    /// root; a single leading `/` is ignored.
    pub async fn get_toaster_file(&self, id: &str, path: &str) -> Result<ResponseBody, ToastateError> {
        require_id(id, "ID of the Toaster")?;
        let path = path.strip_prefix('/').unwrap_or(path);
        require_id(path, "Path of the file to retrieve")?;
        self.client
            .get_stream(Access::Authenticated, &format!("/toaster/file/{id}/{path}"))
            .await
    }

    pub async fn list_toaster_files(&self, id: &str) -> Result<Vec<String>, ToastateError> {
        require_id(id, "ID of the Toaster to get")?;
        let resp: FilesResponse = self
            .client
            .get(Access::Authenticated, &format!("/toaster/listfiles/{id}"))
            .await?;
        Ok(resp.files)
    }

    /// Output of one execution of a toaster. An empty `exe_id` leaves the
    /// choice of execution to the API.
    pub async fn get_toaster_logs(&self, id: &str, exe_id: &str) -> Result<Vec<u8>, ToastateError> {
        require_id(id, "ID of the Toaster to get")?;
        let resp: LogsResponse = self
            .client
            .get(Access::Authenticated, &format!("/toaster/logs/{id}/{exe_id}"))
            .await?;
        Ok(resp.logs)
    }

    pub async fn list_toasters(&self) -> Result<Vec<Toaster>, ToastateError> {
        let resp: ListResponse = self
            .client
            .get(Access::Authenticated, "/toaster/list")
            .await?;
        Ok(resp.toasters)
    }

    pub async fn delete_toasters(&self, ids: &[String]) -> Result<(), ToastateError> {
        if ids.is_empty() || ids.iter().any(String::is_empty) {
            return Err(ToastateError::InvalidInput(
                "you did not provide the IDs of the Toasters to delete".into(),
            ));
        }
        info!(count = ids.len(), "Deleting toasters");
        let _: Acknowledged = self
            .client
            .delete(Access::Authenticated, "/toaster", &DeleteRequest { toaster_ids: ids })
            .await?;
        Ok(())
    }

    pub async fn create_toaster(&self, input: CreateToasterInput) -> Result<ToasterDeployment, ToastateError> {
        let request = ToasterRequest {
            crypto_secure: input.crypto_secure,
            build_cmd: input.build_cmd,
            exe_cmd: input.exe_cmd,
            env: input.env,
            joinable_for_secs: non_zero(input.joinable_for_secs),
            max_concurrent_joiners: non_zero(input.max_concurrent_joiners),
            timeout_secs: non_zero(input.timeout_secs),
            name: non_empty(input.name),
            readme: non_empty(input.readme),
            keywords: input.keywords,
            ..ToasterRequest::default()
        };
        info!(name = ?request.name, "Creating toaster");
        self.deploy(UploadMethod::Post, "/toaster", input.code, request, false)
            .await
    }

    pub async fn update_toaster(
        &self,
        id: &str,
        input: UpdateToasterInput,
    ) -> Result<ToasterDeployment, ToastateError> {
        require_id(id, "ID of the Toaster to update")?;
        let request = ToasterRequest {
            git_refresh: input.git_refresh,
            build_cmd: input.build_cmd,
            exe_cmd: input.exe_cmd,
            env: input.env,
            joinable_for_secs: input.joinable_for_secs,
            max_concurrent_joiners: input.max_concurrent_joiners,
            timeout_secs: input.timeout_secs,
            name: input.name,
            readme: input.readme,
            keywords: input.keywords,
            ..ToasterRequest::default()
        };
        info!(toaster_id = id, "Updating toaster");
        self.deploy(UploadMethod::Put, &format!("/toaster/{id}"), input.code, request, true)
            .await
    }

    /// Send `request` with the code attached the way `code` asks for. On
    /// updates, git settings are sent even when empty so they can be cleared.
    async fn deploy(
        &self,
        method: UploadMethod,
        path: &str,
        code: CodeSource,
        mut request: ToasterRequest,
        is_update: bool,
    ) -> Result<ToasterDeployment, ToastateError> {
        let access = Access::Authenticated;
        let resp: DeploymentResponse = match code {
            CodeSource::Folder(folder) => {
                self.client
                    .upload_folder(access, method, path, &folder, Some(&request))
                    .await?
            }
            CodeSource::Stream(queue) => {
                self.client
                    .upload_from_queue(access, method, path, queue, Some(&request))
                    .await?
            }
            code => {
                match code {
                    CodeSource::Inline { codes, code_paths } => {
                        if codes.len() != code_paths.len() {
                            return Err(ToastateError::InvalidInput(format!(
                                "{} code blobs for {} code paths",
                                codes.len(),
                                code_paths.len()
                            )));
                        }
                        request.codes = codes;
                        request.code_paths = code_paths;
                    }
                    CodeSource::Git(git) => {
                        let keep = |value: String| {
                            if is_update {
                                Some(value)
                            } else {
                                non_empty(value)
                            }
                        };
                        request.git_url = keep(git.url);
                        request.git_username = keep(git.username);
                        request.git_access_token = keep(git.access_token);
                        request.git_password = keep(git.password);
                        request.git_branch = keep(git.branch);
                    }
                    _ => {}
                }
                match method {
                    UploadMethod::Post => self.client.post(access, path, &request).await?,
                    UploadMethod::Put => self.client.put(access, path, &request).await?,
                }
            }
        };

        let deployment = resp.into_deployment()?;
        info!(
            toaster_id = %deployment.toaster.id,
            domain = %deployment.domain,
            build_log_bytes = deployment.build_logs.len(),
            "Toaster deployed"
        );
        Ok(deployment)
    }
}
