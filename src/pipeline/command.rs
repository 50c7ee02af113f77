//! Pipeline backed by an external program.
//!
//! The program performs the whole content sequence for one channel and prints
//! its artifact as JSON on the last line of stdout.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::{Artifact, Pipeline};
use crate::channel::ChannelType;
use crate::error::PipelineError;

const STDERR_TAIL_BYTES: usize = 2048;

/// How to launch a channel's pipeline program, from `[pipelines.<channel>]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    /// Arguments; `{channel}` is replaced with the channel name.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

pub struct CommandPipeline {
    spec: CommandSpec,
}

impl CommandPipeline {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    fn command(&self, channel: ChannelType) -> Command {
        let mut cmd = Command::new(&self.spec.program);
        cmd.args(
            self.spec
                .args
                .iter()
                .map(|arg| arg.replace("{channel}", channel.as_str())),
        )
        .envs(&self.spec.env)
        .env("YTAUTO_CHANNEL", channel.as_str())
        .stdin(Stdio::null())
        .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Pipeline for CommandPipeline {
    async fn run(&self, channel: ChannelType) -> Result<Artifact, PipelineError> {
        debug!(channel = %channel, program = %self.spec.program, "Launching pipeline command");
        let mut cmd = self.command(channel);
        let output = cmd.output();

        let output = match self.spec.timeout_secs {
            Some(secs) => {
                let limit = Duration::from_secs(secs);
                tokio::time::timeout(limit, output)
                    .await
                    .map_err(|_| PipelineError::Timeout(limit))??
            }
            None => output.await?,
        };

        if !output.status.success() {
            return Err(PipelineError::Command {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(parse_artifact(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Last non-empty stdout line as JSON, or the whole output wrapped as text.
fn parse_artifact(stdout: &str) -> Artifact {
    let last = stdout.lines().rev().find(|line| !line.trim().is_empty());
    match last.map(|line| serde_json::from_str::<Artifact>(line.trim())) {
        Some(Ok(value)) => value,
        _ => serde_json::json!({ "stdout": stdout.trim() }),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandPipeline {
        CommandPipeline::new(CommandSpec {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: BTreeMap::new(),
            timeout_secs: None,
        })
    }

    #[test]
    fn artifact_from_last_json_line() {
        let artifact = parse_artifact("rendering...\n{\"video\":\"out.mp4\"}\n\n");
        assert_eq!(artifact, serde_json::json!({"video": "out.mp4"}));
    }

    #[test]
    fn non_json_output_is_wrapped() {
        let artifact = parse_artifact("done\n");
        assert_eq!(artifact, serde_json::json!({"stdout": "done"}));
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let long = "x".repeat(STDERR_TAIL_BYTES) + "END";
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.len(), STDERR_TAIL_BYTES);
        assert!(tail.ends_with("END"));
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: CommandSpec = toml::from_str(r#"program = "python3""#).unwrap();
        assert_eq!(spec.program, "python3");
        assert!(spec.args.is_empty());
        assert!(spec.timeout_secs.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn substitutes_channel_and_sets_env() {
        let pipeline = CommandPipeline::new(CommandSpec {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "printf '{\"arg\":\"%s\",\"env\":\"%s\"}\\n' \"$0\" \"$YTAUTO_CHANNEL\"".into(),
                "{channel}".into(),
            ],
            env: BTreeMap::new(),
            timeout_secs: None,
        });

        let artifact = pipeline.run(ChannelType::Facts).await.unwrap();
        assert_eq!(artifact["arg"], "facts");
        assert_eq!(artifact["env"], "facts");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let err = sh("echo 'quota exceeded' >&2; exit 3")
            .run(ChannelType::Horror)
            .await
            .unwrap_err();
        match err {
            PipelineError::Command { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "quota exceeded");
            }
            other => panic!("expected Command error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_enforced() {
        let mut pipeline = sh("sleep 5");
        pipeline.spec.timeout_secs = Some(1);
        let err = pipeline.run(ChannelType::Finance).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let pipeline = CommandPipeline::new(CommandSpec {
            program: "ytauto-definitely-not-installed".into(),
            args: vec![],
            env: BTreeMap::new(),
            timeout_secs: None,
        });
        let err = pipeline.run(ChannelType::Horror).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
