use anyhow::{Context, Result, anyhow, bail};
use chrono::{Duration, Local};
use clap::{Args, Subcommand};
use dcp::{
    Certificate, CertificateChain, Dcp, Key, ReadOptions, Standard,
    essence::MxfProbe,
    kdm::{DecryptedKdm, EncryptedKdm},
    utils,
};
use kdam::term::Colorizer;
use openssl::pkey::PKey;
use std::{fs, path::PathBuf};

/// Create and decrypt Key Delivery Messages.
#[derive(Debug, Clone, Args)]
pub struct Kdm {
    #[command(subcommand)]
    command: KdmCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum KdmCommands {
    Create(Create),
    Decrypt(Decrypt),
}

impl Kdm {
    pub fn execute(self) -> Result<()> {
        match self.command {
            KdmCommands::Create(args) => args.execute(),
            KdmCommands::Decrypt(args) => args.execute(),
        }
    }
}

/// Make a KDM giving the content keys of a CPL to one recipient.
#[derive(Debug, Clone, Args)]
struct Create {
    /// Package directory holding the CPL.
    directory: PathBuf,

    /// Id of the CPL; may be left out when the package has only one.
    #[arg(long)]
    cpl: Option<String>,

    /// Content key of an asset as KEYID:HEX (repeatable).
    #[arg(short, long = "key", value_name = "KEYID:HEX", required = true, value_parser = parse_key)]
    keys: Vec<(String, Key)>,

    /// Certificate of the recipient (PEM).
    #[arg(short, long)]
    recipient: PathBuf,

    /// Certificate chain of the signer (PEM bundle).
    #[arg(long)]
    signer: PathBuf,

    /// Private key of the signer's leaf certificate (PEM).
    #[arg(long)]
    signer_key: PathBuf,

    /// Start of the validity window, e.g. 2024-01-01T00:00:00+00:00.
    /// By default now is used.
    #[arg(long)]
    valid_from: Option<String>,

    /// End of the validity window. By default one week after the start.
    #[arg(long)]
    valid_to: Option<String>,

    /// Write the key blocks in the 134 byte Interop layout.
    #[arg(long)]
    interop: bool,

    /// Annotation text of the KDM.
    #[arg(long)]
    annotation: Option<String>,

    /// Path of the KDM to write.
    #[arg(short, long)]
    output: PathBuf,
}

impl Create {
    fn execute(self) -> Result<()> {
        let mut dcp = Dcp::new(&self.directory)?;
        dcp.read(&ReadOptions::default(), &MxfProbe)?;

        let cpl = match &self.cpl {
            Some(id) => dcp
                .cpls_mut()
                .iter_mut()
                .find(|x| x.id == utils::remove_urn_uuid(id))
                .ok_or_else(|| anyhow!("no CPL {id} in {}", self.directory.display()))?,
            None => match dcp.cpls_mut() {
                [cpl] => cpl,
                cpls => bail!("package has {} CPLs; choose one with --cpl", cpls.len()),
            },
        };

        for (key_id, key) in &self.keys {
            let mut found = false;
            for asset in cpl.reel_assets_mut() {
                if asset.key_id.as_deref() == Some(key_id.as_str()) {
                    asset.key = Some(*key);
                    found = true;
                }
            }

            if !found {
                log::warn!("no asset in CPL {} has key id {key_id}", cpl.id);
            }
        }

        let not_valid_before = match &self.valid_from {
            Some(x) => utils::parse_timestamp(x)?,
            None => Local::now().fixed_offset(),
        };
        let not_valid_after = match &self.valid_to {
            Some(x) => utils::parse_timestamp(x)?,
            None => not_valid_before + Duration::days(7),
        };

        let standard = if self.interop {
            Standard::Interop
        } else {
            Standard::Smpte
        };

        let mut signer = CertificateChain::from_pem_file(&self.signer)?;
        signer.set_key_from_pem_file(&self.signer_key)?;
        let recipient = Certificate::from_pem_file(&self.recipient)?;

        let kdm = DecryptedKdm::new(
            cpl,
            &not_valid_before,
            &not_valid_after,
            self.annotation.clone(),
            utils::format_timestamp(&Local::now().fixed_offset()),
            standard,
        )?;
        kdm.encrypt(&signer, &recipient)?.write(&self.output)?;

        println!(
            "{} KDM for {} with {} key(s) to {}",
            "Wrote".colorize("bold green"),
            cpl.content_title_text,
            kdm.keys().len(),
            self.output.display()
        );
        Ok(())
    }
}

/// Decrypt a KDM and print its content keys.
#[derive(Debug, Clone, Args)]
struct Decrypt {
    /// The KDM to decrypt.
    kdm: PathBuf,

    /// Private key of the recipient (PEM).
    #[arg(short, long)]
    key: PathBuf,

    /// Also give the keys to the CPL in this package directory.
    #[arg(long)]
    dcp: Option<PathBuf>,
}

impl Decrypt {
    fn execute(self) -> Result<()> {
        let encrypted = EncryptedKdm::read(&self.kdm)?;

        match encrypted.verify_signature() {
            Ok(chain) => log::info!(
                "signed by {}",
                chain.leaf().map(|x| x.subject()).unwrap_or_default()
            ),
            Err(e) => log::warn!("signature of {} does not verify: {e}", self.kdm.display()),
        }

        let pem = fs::read(&self.key).with_context(|| format!("could not read {}", self.key.display()))?;
        let private_key = PKey::private_key_from_pem(&pem)?;
        let kdm = DecryptedKdm::decrypt(&encrypted, &private_key)?;

        println!("{} {}", "CPL".colorize("cyan"), kdm.cpl_id());
        println!("{} {}", "Title".colorize("cyan"), kdm.content_title_text);
        println!(
            "{} {} to {}",
            "Valid".colorize("cyan"),
            kdm.not_valid_before(),
            kdm.not_valid_after()
        );

        for key in kdm.keys() {
            println!("    {} {} {}", key.key_type.colorize("cyan"), key.key_id, key.key);
        }

        if let Some(directory) = &self.dcp {
            let mut dcp = Dcp::new(directory)?;
            dcp.read(&ReadOptions::default(), &MxfProbe)?;
            let keyed = dcp.add_kdm(&kdm);
            println!("{} {keyed} asset(s) of {}", "Keyed".colorize("bold green"), directory.display());
        }

        Ok(())
    }
}

fn parse_key(value: &str) -> Result<(String, Key)> {
    let (key_id, key) = value
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected KEYID:HEX, got '{value}'"))?;
    Ok((utils::remove_urn_uuid(key_id), key.parse()?))
}
