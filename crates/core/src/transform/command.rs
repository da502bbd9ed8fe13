//! Subprocess-based transformer driving an external processing tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::QualityConfig;

use super::traits::{TransformError, Transformer};
use super::types::QualityReport;

/// Exit code the tool uses for an unreadable raw artifact.
const DECODE_ERROR_EXIT_CODE: i32 = 2;

/// Transformer that shells out to the external processing toolkit.
///
/// The tool owns the whole scientific chain (decode, calibrate, reproject,
/// subset, write) and prints a [`QualityReport`] as JSON on stdout. Quality
/// thresholds are forwarded as flags so the skip decision lives in one
/// place.
pub struct CommandTransformer {
    tool_path: PathBuf,
    quality: QualityConfig,
}

impl CommandTransformer {
    pub fn new(tool_path: impl Into<PathBuf>, quality: QualityConfig) -> Self {
        Self {
            tool_path: tool_path.into(),
            quality,
        }
    }

    fn build_command(&self, input_path: &Path, output_path: &Path) -> Command {
        let mut cmd = Command::new(&self.tool_path);
        cmd.arg("--input")
            .arg(input_path)
            .arg("--output")
            .arg(output_path)
            .arg("--max-missing-pct")
            .arg(self.quality.max_missing_pct.to_string())
            .arg("--max-solar-zenith")
            .arg(self.quality.max_solar_zenith.to_string())
            .arg("--saturation-threshold")
            .arg(self.quality.saturation_threshold.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl Transformer for CommandTransformer {
    fn name(&self) -> &str {
        "command"
    }

    async fn transform(
        &self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<QualityReport, TransformError> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(
            "Running transform tool {} on {}",
            self.tool_path.display(),
            input_path.display()
        );

        let output = self
            .build_command(input_path, output_path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TransformError::ToolNotFound {
                        path: self.tool_path.clone(),
                    }
                } else {
                    TransformError::Io(e)
                }
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            if output.status.code() == Some(DECODE_ERROR_EXIT_CODE) {
                return Err(TransformError::Decode {
                    path: input_path.to_path_buf(),
                    reason: stderr.lines().last().unwrap_or("unreadable input").to_string(),
                });
            }
            return Err(TransformError::TransformFailed {
                reason: format!("tool exited with code {:?}", output.status.code()),
                stderr: if stderr.is_empty() { None } else { Some(stderr) },
            });
        }

        let report: QualityReport =
            serde_json::from_slice(&output.stdout).map_err(|e| TransformError::MalformedReport {
                reason: e.to_string(),
            })?;

        if report.skip {
            warn!(
                "Transform of {} reported skip: {}",
                input_path.display(),
                report.skip_reason.as_deref().unwrap_or("unspecified")
            );
            // A skipping tool must not leave a partial derived artifact.
            if tokio::fs::try_exists(output_path).await.unwrap_or(false) {
                let _ = tokio::fs::remove_file(output_path).await;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quality() -> QualityConfig {
        QualityConfig {
            max_missing_pct: 50.0,
            max_solar_zenith: 85.0,
            saturation_threshold: 0.95,
        }
    }

    #[test]
    fn test_command_carries_thresholds() {
        let transformer = CommandTransformer::new("/usr/local/bin/seviri-transform", quality());
        let cmd = transformer.build_command(Path::new("/raw/in.nat"), Path::new("/out/out.nc"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert!(args.contains(&"--input".to_string()));
        assert!(args.contains(&"/raw/in.nat".to_string()));
        assert!(args.contains(&"--max-missing-pct".to_string()));
        assert!(args.contains(&"50".to_string()));
        assert!(args.contains(&"--max-solar-zenith".to_string()));
        assert!(args.contains(&"85".to_string()));
    }

    #[tokio::test]
    async fn test_missing_tool_is_tool_not_found() {
        let transformer = CommandTransformer::new("/nonexistent/transform-tool", quality());
        let temp = tempfile::tempdir().unwrap();
        let result = transformer
            .transform(
                &temp.path().join("in.nat"),
                &temp.path().join("out.nc"),
            )
            .await;

        assert!(matches!(result, Err(TransformError::ToolNotFound { .. })));
    }
}
