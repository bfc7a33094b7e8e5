use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use seal_cli::api::client::SealClient;
use seal_cli::config::{self, Workspace};
use seal_cli::directory::{Directory, PinnedKey};
use seal_cli::feature::file_crypt::{FileCrypt, Origin};
use seal_cli::feature::{files, identity};
use seal_cli::key_store::FileKeyStore;
use seal_cli::tracing_init;

#[derive(Parser)]
#[command(name = "seal")]
#[command(
    about = "Sign, encrypt and exchange files with RSA + AES hybrid envelopes",
    version
)]
struct Cli {
    /// Debug mode (logs to <data-dir>/debug.log)
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Non-default path to config file (defaults to <data-dir>/seal.toml)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<String>,

    /// Directory holding the private key, token and working files
    /// (defaults to ~/.seal)
    #[arg(short = 'D', long = "data-dir", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    subcommand: CliSubcommand,
}

#[derive(Subcommand)]
enum CliSubcommand {
    /// Generate a key pair and register it with the directory
    CreateId {
        /// Full name to register
        name: String,

        /// Email to register
        email: String,
    },
    /// Search the directory by name or email
    SearchId {
        query: String,
    },
    /// Delete an identity owned by your token
    DeleteId {
        user_id: String,
    },
    /// Generate a key pair locally without registering it
    Keygen,
    /// Print the public key of the local private key
    ExportKey {
        /// Write the key to a file instead of stdout
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Sign a file; the signature is attached when the file is next encrypted
    Sign {
        file: PathBuf,
    },
    /// Encrypt a file for a recipient
    Encrypt {
        file: PathBuf,

        #[command(flatten)]
        dest: DestArgs,
    },
    /// Sign and encrypt a file for a recipient
    EncSign {
        file: PathBuf,

        #[command(flatten)]
        dest: DestArgs,
    },
    /// Sign, encrypt and upload a file for a recipient
    Upload {
        file: PathBuf,

        #[command(flatten)]
        dest: DestArgs,
    },
    /// List your uploaded files
    ListFiles,
    /// Delete an uploaded file
    DeleteFile {
        file_id: String,
    },
    /// Download, decrypt and verify a file
    Download {
        file_id: String,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Decrypt and verify a local envelope
    Decrypt {
        envelope: PathBuf,

        #[command(flatten)]
        source: SourceArgs,

        /// Output file (defaults to <data-dir>/downloaded_files/<envelope name>)
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct DestArgs {
    /// User id of the recipient
    #[arg(long = "dest-id", value_name = "ID")]
    dest_id: String,

    /// Use this PEM public key for the recipient instead of the directory
    #[arg(long = "dest-key", value_name = "PEM")]
    dest_key: Option<PathBuf>,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// User id of the signer; the signature is verified against their key
    #[arg(
        long = "source-id",
        value_name = "ID",
        required_unless_present = "unsigned",
        conflicts_with = "unsigned"
    )]
    source_id: Option<String>,

    /// The envelope was encrypted without a signature
    #[arg(long = "unsigned")]
    unsigned: bool,

    /// Use this PEM public key for the signer instead of the directory
    #[arg(long = "source-key", value_name = "PEM", requires = "source_id")]
    source_key: Option<PathBuf>,
}

impl SourceArgs {
    fn origin(&self) -> Origin<'_> {
        match self.source_id.as_deref() {
            Some(source_id) => Origin::Signed { source_id },
            None => Origin::Unsigned,
        }
    }
}

/// What a command needs to reach its local state and, when asked for, the
/// server.
struct Context {
    workspace: Workspace,
    config_path_override: Option<String>,
}

impl Context {
    fn crypt(&self) -> FileCrypt<FileKeyStore> {
        FileCrypt::from_workspace(&self.workspace)
    }

    fn key_store(&self) -> FileKeyStore {
        FileKeyStore::new(self.workspace.private_key_path())
    }

    /// Authenticated client. Only network commands call this, so offline
    /// commands never ask for a token.
    fn client(&self) -> Result<SealClient, Box<dyn Error>> {
        let cfg = config::get_config(&self.workspace, &self.config_path_override)?;
        let token = config::get_token(&self.workspace)?;
        let mut client = SealClient::new(&config::get_server_url(&cfg));
        client.set_token(&token);
        Ok(client)
    }

    fn directory(&self, pinned_key: Option<&Path>) -> Result<Directory, Box<dyn Error>> {
        match pinned_key {
            Some(path) => Ok(Directory::Pinned(pinned(path)?)),
            None => Ok(Directory::Remote(self.client()?)),
        }
    }
}

fn pinned(path: &Path) -> Result<PinnedKey, Box<dyn Error>> {
    PinnedKey::from_file(path)
        .map_err(|e| format!("cannot read public key '{}': {}", path.display(), e).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    let root = match args.data_dir {
        Some(ref dir) => dir.clone(),
        None => Workspace::default_root()?,
    };
    let workspace = Workspace::new(root);
    if let Err(e) = workspace.create_dir_if_missing() {
        eprintln!(
            "error: could not create {}: {}",
            workspace.root().display(),
            e
        );
        process::exit(1);
    }

    let debug_log = args.debug.then(|| workspace.debug_log_path());
    if let Err(e) = tracing_init::init_tracing(debug_log.as_deref()) {
        eprintln!("error: could not open debug log: {}", e);
        process::exit(1);
    }

    let ctx = Context {
        workspace,
        config_path_override: args.config,
    };
    if let Err(e) = run(&ctx, args.subcommand).await {
        tracing::debug!("command failed: {:?}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(ctx: &Context, subcommand: CliSubcommand) -> Result<(), Box<dyn Error>> {
    match subcommand {
        CliSubcommand::CreateId { name, email } => {
            identity::create_id(&ctx.client()?, &ctx.key_store(), &name, &email).await?;
        }
        CliSubcommand::SearchId { query } => {
            identity::search_id(&ctx.client()?, &query).await?;
        }
        CliSubcommand::DeleteId { user_id } => {
            identity::delete_id(&ctx.client()?, &user_id).await?;
        }
        CliSubcommand::Keygen => {
            identity::keygen(&ctx.key_store())?;
        }
        CliSubcommand::ExportKey { out } => {
            identity::export_key(&ctx.key_store(), out.as_deref())?;
        }
        CliSubcommand::Sign { file } => {
            let slot = files::sign(&ctx.crypt(), &file)?;
            println!("Signature stored in {}", slot.display());
        }
        CliSubcommand::Encrypt { file, dest } => {
            let directory = ctx.directory(dest.dest_key.as_deref())?;
            let out = files::encrypt(&ctx.crypt(), &directory, &file, &dest.dest_id, false).await?;
            println!("Envelope written to {}", out.display());
        }
        CliSubcommand::EncSign { file, dest } => {
            let directory = ctx.directory(dest.dest_key.as_deref())?;
            let out = files::encrypt(&ctx.crypt(), &directory, &file, &dest.dest_id, true).await?;
            println!("Envelope written to {}", out.display());
        }
        CliSubcommand::Upload { file, dest } => {
            let client = ctx.client()?;
            let directory = match dest.dest_key {
                Some(ref path) => Directory::Pinned(pinned(path)?),
                None => Directory::Remote(client.clone()),
            };
            files::upload(&client, &ctx.crypt(), &directory, &file, &dest.dest_id).await?;
        }
        CliSubcommand::ListFiles => {
            files::list_files(&ctx.client()?).await?;
        }
        CliSubcommand::DeleteFile { file_id } => {
            files::delete_file(&ctx.client()?, &file_id).await?;
        }
        CliSubcommand::Download { file_id, source } => {
            let client = ctx.client()?;
            let directory = match source.source_key {
                Some(ref path) => Directory::Pinned(pinned(path)?),
                None => Directory::Remote(client.clone()),
            };
            files::download(
                &client,
                &ctx.crypt(),
                &directory,
                &ctx.workspace.downloaded_dir(),
                &file_id,
                source.origin(),
            )
            .await?;
        }
        CliSubcommand::Decrypt {
            envelope,
            source,
            out,
        } => {
            // Unsigned envelopes need no directory at all.
            let directory = match (&source.source_key, source.unsigned) {
                (Some(path), _) => Directory::Pinned(pinned(path)?),
                (None, true) => Directory::Pinned(PinnedKey::new(String::new())),
                (None, false) => ctx.directory(None)?,
            };
            let out = match out {
                Some(out) => out,
                None => {
                    let downloaded_dir = ctx.workspace.downloaded_dir();
                    std::fs::create_dir_all(&downloaded_dir)?;
                    let name = envelope
                        .file_name()
                        .ok_or_else(|| format!("'{}' is not a file", envelope.display()))?;
                    downloaded_dir.join(name)
                }
            };
            files::decrypt(&ctx.crypt(), &directory, &envelope, source.origin(), &out).await?;
        }
    }
    Ok(())
}
