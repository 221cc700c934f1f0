use tracing::debug;

use crate::utils::command::CommandUtils;

pub struct GpuUtils;

impl GpuUtils {
    /// Probes the first GPU's compute capability via nvidia-smi. Returns None
    /// when no GPU or driver is available; callers treat that as "skip the
    /// optional step", never as a failure.
    pub fn compute_capability() -> Option<f32> {
        let output = CommandUtils::run_command_str(
            "nvidia-smi --query-gpu=compute_cap --format=csv,noheader",
            None,
        )
        .ok()?;

        if output.status != 0 {
            debug!("nvidia-smi probe failed: {}", output.stderr.trim());
            return None;
        }

        Self::parse_compute_cap(&output.stdout)
    }

    fn parse_compute_cap(stdout: &str) -> Option<f32> {
        stdout.lines().next()?.trim().parse::<f32>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_gpu_line() {
        assert_eq!(GpuUtils::parse_compute_cap("8.9\n8.9\n"), Some(8.9));
        assert_eq!(GpuUtils::parse_compute_cap(" 12.0 \n"), Some(12.0));
        assert_eq!(GpuUtils::parse_compute_cap(""), None);
        assert_eq!(GpuUtils::parse_compute_cap("No devices were found\n"), None);
    }
}
