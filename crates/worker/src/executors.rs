use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scheduler_errors::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::registry::TaskFactory;
use crate::task::{ScheduledTask, TaskContext};

/// Shell任务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellTaskParams {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Shell任务：运行外部命令，非零退出码视为失败
///
/// 运行被取消时子进程随之被终止。
#[derive(Debug, Default)]
pub struct ShellTask;

impl ShellTask {
    pub fn new() -> Self {
        Self
    }
}

const OUTPUT_TAIL_CHARS: usize = 512;

fn tail(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(OUTPUT_TAIL_CHARS);
    text.chars().skip(skip).collect()
}

#[async_trait]
impl ScheduledTask for ShellTask {
    async fn execute(&self, ctx: TaskContext) -> SchedulerResult<()> {
        let params: ShellTaskParams = ctx.params()?;
        if params.command.trim().is_empty() {
            return Err(SchedulerError::invalid_params("Shell任务缺少command参数"));
        }

        info!(
            "执行Shell任务: task={}, command={}, args={:?}",
            ctx.task_name, params.command, params.args
        );

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &params.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SchedulerError::task_execution(format!("启动Shell命令失败: {e}")))?;

        // 取消时丢弃 wait_with_output，kill_on_drop 负责终止子进程
        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| SchedulerError::task_execution(format!("等待进程结束失败: {e}")))?,
            _ = ctx.cancelled() => return Err(SchedulerError::Cancelled),
        };

        if output.status.success() {
            debug!(
                "Shell任务执行完成: task={}, stdout={}",
                ctx.task_name,
                tail(&output.stdout)
            );
            Ok(())
        } else {
            let stderr = tail(&output.stderr);
            Err(SchedulerError::task_execution(if stderr.is_empty() {
                format!("命令执行失败，退出码: {:?}", output.status.code())
            } else {
                format!(
                    "命令执行失败，退出码: {:?}, stderr: {stderr}",
                    output.status.code()
                )
            }))
        }
    }
}

/// 保活任务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveParams {
    pub url: String,
    /// 单次请求超时，未配置时依赖任务级超时和取消信号
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

/// 保活任务：对目标地址发起GET请求，非2xx视为失败
pub struct KeepAliveTask {
    client: reqwest::Client,
}

impl KeepAliveTask {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for KeepAliveTask {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduledTask for KeepAliveTask {
    async fn execute(&self, ctx: TaskContext) -> SchedulerResult<()> {
        let params: KeepAliveParams = ctx.params()?;
        if !params.url.starts_with("http://") && !params.url.starts_with("https://") {
            return Err(SchedulerError::invalid_params(format!(
                "保活任务的url必须以http://或https://开头: {}",
                params.url
            )));
        }

        let mut request = self.client.get(&params.url);
        if let Some(secs) = params.request_timeout_seconds {
            request = request.timeout(Duration::from_secs(secs));
        }

        let response = tokio::select! {
            response = request.send() => response
                .map_err(|e| SchedulerError::task_execution(format!("HTTP请求失败: {e}")))?,
            _ = ctx.cancelled() => return Err(SchedulerError::Cancelled),
        };

        let status = response.status();
        if status.is_success() {
            debug!("保活请求成功: task={}, status={}", ctx.task_name, status);
            Ok(())
        } else {
            Err(SchedulerError::task_execution(format!(
                "HTTP请求返回非成功状态码: {status}"
            )))
        }
    }
}

/// 宿主进程内置的任务类型清单
pub fn default_manifest() -> Vec<(String, TaskFactory)> {
    vec![
        (
            "shell".to_string(),
            Arc::new(|| Arc::new(ShellTask::new()) as Arc<dyn ScheduledTask>) as TaskFactory,
        ),
        (
            "keep_alive".to_string(),
            Arc::new(|| Arc::new(KeepAliveTask::new()) as Arc<dyn ScheduledTask>) as TaskFactory,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TaskRegistry;
    use chrono::Utc;
    use tokio_util::sync::CancellationToken;

    fn context(kind: &str, parameters: serde_json::Value) -> TaskContext {
        TaskContext {
            task_id: 1,
            task_name: format!("{kind}-test"),
            kind: kind.to_string(),
            parameters,
            started_at: Utc::now(),
            cancellation: CancellationToken::new(),
        }
    }

    #[test]
    fn test_default_manifest_builds() {
        let registry = TaskRegistry::from_manifest(default_manifest()).unwrap();
        assert_eq!(
            registry.kinds(),
            vec!["keep_alive".to_string(), "shell".to_string()]
        );
    }

    #[test]
    fn test_tail_keeps_end_of_output() {
        let long = "x".repeat(OUTPUT_TAIL_CHARS) + "END";
        let tailed = tail(long.as_bytes());
        assert_eq!(tailed.chars().count(), OUTPUT_TAIL_CHARS);
        assert!(tailed.ends_with("END"));
        assert_eq!(tail(b"  short \n"), "short");
    }

    #[tokio::test]
    async fn test_shell_missing_command() {
        let result = ShellTask::new()
            .execute(context("shell", serde_json::json!({"args": ["x"]})))
            .await;
        assert!(matches!(result, Err(SchedulerError::InvalidTaskParams(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_success_and_failure() {
        let ok = ShellTask::new()
            .execute(context(
                "shell",
                serde_json::json!({"command": "sh", "args": ["-c", "echo hello"]}),
            ))
            .await;
        assert!(ok.is_ok());

        let failed = ShellTask::new()
            .execute(context(
                "shell",
                serde_json::json!({"command": "sh", "args": ["-c", "echo bad >&2; exit 3"]}),
            ))
            .await;
        let message = failed.unwrap_err().to_string();
        assert!(message.contains("bad"));
        assert!(message.contains('3'));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_env_and_working_dir() {
        let dir = std::env::temp_dir().canonicalize().unwrap();
        let result = ShellTask::new()
            .execute(context(
                "shell",
                serde_json::json!({
                    "command": "sh",
                    "args": ["-c", "test \"$MARKER\" = yes && test \"$(pwd -P)\" = \"$EXPECTED\""],
                    "working_dir": dir.to_string_lossy(),
                    "env": {
                        "MARKER": "yes",
                        "EXPECTED": dir.to_string_lossy()
                    }
                }),
            ))
            .await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_cancellation() {
        let ctx = context("shell", serde_json::json!({"command": "sleep", "args": ["30"]}));
        let token = ctx.cancellation.clone();
        let handle = tokio::spawn(async move { ShellTask::new().execute(ctx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("shell task did not observe cancellation")
            .unwrap();
        assert!(matches!(result, Err(SchedulerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_keep_alive_rejects_bad_url() {
        let result = KeepAliveTask::new()
            .execute(context("keep_alive", serde_json::json!({"url": "localhost"})))
            .await;
        assert!(matches!(result, Err(SchedulerError::InvalidTaskParams(_))));
    }
}
