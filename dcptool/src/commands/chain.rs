use anyhow::{Context, Result, anyhow};
use clap::{Args, Subcommand};
use dcp::{CertificateChain, ChainSubject};
use kdam::term::Colorizer;
use std::{fs, path::PathBuf};

/// Work with certificate chains.
#[derive(Debug, Clone, Args)]
pub struct Chain {
    #[command(subcommand)]
    command: ChainCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum ChainCommands {
    Check(Check),
    Create(Create),
}

impl Chain {
    pub fn execute(self) -> Result<()> {
        match self.command {
            ChainCommands::Check(args) => args.execute(),
            ChainCommands::Create(args) => args.execute(),
        }
    }
}

/// Issue a root, intermediate and leaf certificate for signing.
///
/// Writes ca.self-signed.pem, intermediate.signed.pem, leaf.signed.pem,
/// chain.pem (all three, root first) and leaf.key.
#[derive(Debug, Clone, Args)]
struct Create {
    /// Directory to write the certificates to.
    directory: PathBuf,

    #[arg(long, default_value = "example.org")]
    organisation: String,

    #[arg(long, default_value = "example.org")]
    organisational_unit: String,

    #[arg(long, default_value = ".smpte-430-2.ROOT.NOT_FOR_PRODUCTION")]
    root_common_name: String,

    #[arg(long, default_value = ".smpte-430-2.INTERMEDIATE.NOT_FOR_PRODUCTION")]
    intermediate_common_name: String,

    #[arg(long, default_value = "CS.smpte-430-2.LEAF.NOT_FOR_PRODUCTION")]
    leaf_common_name: String,

    /// Size of the RSA keys.
    #[arg(long, default_value_t = 2048)]
    key_bits: u32,

    /// Days the root stays valid.
    #[arg(long, default_value_t = 3650)]
    validity_days: u32,
}

impl Create {
    fn execute(self) -> Result<()> {
        let chain = CertificateChain::generate(&ChainSubject {
            organisation: self.organisation,
            organisational_unit: self.organisational_unit,
            root_common_name: self.root_common_name,
            intermediate_common_name: self.intermediate_common_name,
            leaf_common_name: self.leaf_common_name,
            key_bits: self.key_bits,
            validity_days: self.validity_days,
        })?;

        fs::create_dir_all(&self.directory)
            .with_context(|| format!("could not create {}", self.directory.display()))?;

        let names = ["ca.self-signed.pem", "intermediate.signed.pem", "leaf.signed.pem"];
        for (name, certificate) in names.iter().zip(chain.root_to_leaf()) {
            fs::write(self.directory.join(name), certificate.certificate(true)?)?;
        }
        fs::write(self.directory.join("chain.pem"), chain.chain_pem()?)?;

        let key = chain.key_pem()?.ok_or_else(|| anyhow!("generated chain has no key"))?;
        fs::write(self.directory.join("leaf.key"), key)?;

        println!(
            "{} chain for {} to {}",
            "Wrote".colorize("bold green"),
            chain.leaf()?.subject(),
            self.directory.display()
        );
        Ok(())
    }
}

/// Check that a PEM bundle forms a valid chain.
#[derive(Debug, Clone, Args)]
struct Check {
    /// The chain (PEM bundle).
    chain: PathBuf,

    /// Private key which should match the leaf (PEM).
    #[arg(short, long)]
    key: Option<PathBuf>,
}

impl Check {
    fn execute(self) -> Result<()> {
        let mut chain = CertificateChain::from_pem_file(&self.chain)?;
        if let Some(key) = &self.key {
            chain.set_key_from_pem_file(key)?;
        }

        for certificate in chain.root_to_leaf() {
            println!(
                "{} {} ({})",
                "Certificate".colorize("cyan"),
                certificate.subject(),
                certificate.thumbprint()?
            );
        }

        let problems = chain.diagnostics();
        for problem in &problems {
            println!("{} {problem}", "Error".colorize("bold red"));
        }

        if !problems.is_empty() {
            return Err(anyhow!("chain is not valid"));
        }

        println!("{} chain is valid", "Done".colorize("bold green"));
        Ok(())
    }
}
