//! SSH key material used by the platform to clone private repositories.

use std::path::Path;
use std::process::Command;

use anyhow::Context;
use tracing::debug;

const KEY_COMMENT: &str = "builds@bitrise.io";
const KEY_BITS: &str = "4096";

/// An SSH key pair in OpenSSH text form.
#[derive(Clone, PartialEq, Eq)]
pub struct SshKeyPair {
    /// PEM encoded private key.
    pub private_key: String,
    /// `authorized_keys` line.
    pub public_key: String,
}

impl std::fmt::Debug for SshKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshKeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl SshKeyPair {
    /// Generate a fresh RSA key pair with `ssh-keygen`.
    pub fn generate() -> anyhow::Result<Self> {
        let temp = tempfile::TempDir::new().context("Failed to create temp dir for SSH key")?;
        let key_path = temp.path().join("id_rsa");
        let key_arg = key_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid temp key path"))?;

        run_ssh_keygen(&[
            "-q", "-t", "rsa", "-b", KEY_BITS, "-m", "PEM", "-N", "", "-C", KEY_COMMENT, "-f",
            key_arg,
        ])?;

        let private_key = std::fs::read_to_string(&key_path)
            .with_context(|| format!("Failed to read generated key: {}", key_path.display()))?;
        let public_path = key_path.with_extension("pub");
        let public_key = std::fs::read_to_string(&public_path).with_context(|| {
            format!("Failed to read generated key: {}", public_path.display())
        })?;
        debug!("Generated SSH key pair");

        Ok(Self {
            private_key,
            public_key: public_key.trim_end().to_string(),
        })
    }

    /// Read a private key file and derive its public half.
    pub fn from_private_key_file(path: &Path) -> anyhow::Result<Self> {
        let private_key = std::fs::read_to_string(path)
            .with_context(|| format!("SSH private key read failed: {}", path.display()))?;
        let path_arg = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid key path: {}", path.display()))?;
        let public_key = run_ssh_keygen(&["-y", "-f", path_arg])
            .with_context(|| format!("Not a usable SSH private key: {}", path.display()))?;

        Ok(Self {
            private_key,
            public_key: public_key.trim_end().to_string(),
        })
    }
}

fn run_ssh_keygen(args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("ssh-keygen")
        .args(args)
        .output()
        .context("Failed to run ssh-keygen")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ssh-keygen failed: {}", stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
