use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use rcgen::generate_simple_self_signed;
use rolenode::identity::NodeIdentifier;
use sha2::{Digest, Sha256};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Generate a self-signed certificate and key for `secure = true` listeners.
///
/// Also prints the key's public half as hex, ready to paste into
/// `[node] public_key`, together with the node identifier it yields.
#[derive(Parser, Debug)]
#[command(
    name = "rolenode-cert",
    version,
    about = "Generate self-signed TLS material for rolenode listeners"
)]
struct Cli {
    /// Subject alternative names (repeatable)
    #[arg(long = "san", default_value = "localhost")]
    sans: Vec<String>,

    /// Output certificate path
    #[arg(long, default_value = "pki/cert.pem")]
    out_cert: PathBuf,

    /// Output private key path
    #[arg(long, default_value = "pki/key.pem")]
    out_key: PathBuf,

    /// Overwrite output files if they exist
    #[arg(long, action = ArgAction::SetTrue)]
    force: bool,
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_file(path: &Path, contents: &[u8], mode: u32, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} exists; use --force to overwrite", path.display()),
        ));
    }
    ensure_parent(path)?;
    let mut f = File::create(path)?;
    f.write_all(contents)?;
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let ck = generate_simple_self_signed(cli.sans.clone())?;
    let cert_pem = ck.cert.pem();
    let key_pem = ck.key_pair.serialize_pem();

    write_file(&cli.out_cert, cert_pem.as_bytes(), 0o644, cli.force)?;
    write_file(&cli.out_key, key_pem.as_bytes(), 0o600, cli.force)?;

    let fingerprint = base16ct::lower::encode_string(&Sha256::digest(ck.cert.der().as_ref()));
    let public_key = ck.key_pair.public_key_raw();
    let public_key_hex = base16ct::lower::encode_string(public_key);
    let node_id = NodeIdentifier::from_public_key(public_key);

    println!("✅ Generated cert and key");
    println!("  cert:        {}", cli.out_cert.display());
    println!("  key:         {}", cli.out_key.display());
    println!("  cert_sha256: {}", fingerprint);
    println!("  node_id:     {}", node_id);
    println!(
        "\nAdd to config.toml (example):\n[node]\npublic_key = \"{}\"\n\n[tls]\ncert_path = \"{}\"\nkey_path = \"{}\"\n",
        public_key_hex,
        cli.out_cert.display(),
        cli.out_key.display()
    );

    Ok(())
}
