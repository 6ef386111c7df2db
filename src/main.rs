use anyhow::{Context, Result, anyhow, bail};
use autumnus::{FormatterOption, Options, highlight, themes};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{ArgValueCompleter, CompletionCandidate};
use iocraft::prelude::*;
use serde::Serialize;
use std::{
    fs,
    io::{self, IsTerminal, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::runtime::Handle;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;
use wvault::{
    BatchUploadState, PartialFailurePolicy, UploadOptions, UploadSession, VaultClient,
    client::DEFAULT_BASE_URL,
    config::{self, Config, ConfigFile, validate_expiry},
    format::format_file_size,
    local_file::{Selection, SkippedPath, collect_with_stdin},
    rest_types::ModifyEntryRequest,
};

use crate::ui::{
    AlbumView, BatchProgress, BucketView, ConfigHeader, ErrorMessage, FileDetails, InputPrompt,
    RestrictionsView, SuccessMessage, UploadSummary,
};

mod ui;

const STDIN_DEFAULT_NAME: &str = "stdin";

#[derive(Parser)]
#[command(name = "wvault")]
#[command(version)]
#[command(about = "Upload and manage files on WaifuVault")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct UploadArgs {
    /// Files or directories to upload, `-` reads from stdin
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    paths: Vec<PathBuf>,
    /// How long the server keeps the files, e.g. 30m, 12h or 7d
    #[arg(short, long, value_parser = validate_expiry)]
    expires: Option<String>,
    /// Hide the original filename in the resulting URL
    #[arg(long)]
    hide_filename: bool,
    /// Password protect the uploaded files
    #[arg(short, long)]
    password: Option<String>,
    /// Delete each file after its first download
    #[arg(long)]
    one_time_download: bool,
    /// Upload into this bucket instead of the stored one
    #[arg(short, long, conflicts_with = "no_bucket")]
    bucket: Option<String>,
    /// Do not upload into the stored bucket
    #[arg(long)]
    no_bucket: bool,
    /// Fail the whole batch if any file fails
    #[arg(long)]
    strict: bool,
    /// Number of files to upload at the same time
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Include the files inside directories
    #[arg(short, long)]
    recursive: bool,
    /// Filename to use for content read from stdin
    #[arg(long)]
    name: Option<String>,
    /// Skip files larger than the server's size limit before uploading
    #[arg(long)]
    check: bool,
    /// Print the uploaded files as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum BucketCommands {
    /// Create a new bucket
    Create {
        /// Store the new bucket token in the OS keyring
        #[arg(long)]
        save: bool,
    },
    /// List the files and albums in a bucket, the stored one by default
    Show { token: Option<String> },
    /// Delete a bucket and every file in it
    Delete { token: String },
}

#[derive(Subcommand)]
enum AlbumCommands {
    /// Create an album in a bucket
    Create {
        name: String,
        #[arg(short, long)]
        bucket: Option<String>,
    },
    /// Show an album and its files
    Show {
        #[arg(add = ArgValueCompleter::new(album_token_completer))]
        token: String,
    },
    /// Delete an album
    Delete {
        #[arg(add = ArgValueCompleter::new(album_token_completer))]
        token: String,
        /// Also delete the files in the album
        #[arg(long)]
        delete_files: bool,
    },
    /// Make an album publicly viewable
    Share {
        #[arg(add = ArgValueCompleter::new(album_token_completer))]
        token: String,
    },
    /// Revoke the public link of an album
    Revoke {
        #[arg(add = ArgValueCompleter::new(album_token_completer))]
        token: String,
    },
    /// Add files to an album
    Add {
        #[arg(add = ArgValueCompleter::new(album_token_completer))]
        token: String,
        #[arg(required = true, add = ArgValueCompleter::new(file_token_completer))]
        files: Vec<String>,
    },
    /// Remove files from an album
    Remove {
        #[arg(add = ArgValueCompleter::new(album_token_completer))]
        token: String,
        #[arg(required = true, add = ArgValueCompleter::new(file_token_completer))]
        files: Vec<String>,
    },
    /// Download an album as a zip archive
    Download {
        #[arg(add = ArgValueCompleter::new(album_token_completer))]
        token: String,
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
        /// Only include the files with these ids
        #[arg(long = "file-id")]
        file_ids: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files
    Upload(UploadArgs),
    /// Show details about an uploaded file
    Info {
        #[arg(add = ArgValueCompleter::new(file_token_completer))]
        token: String,
        /// Report the retention period in milliseconds
        #[arg(long)]
        raw: bool,
        #[arg(long)]
        json: bool,
    },
    /// Delete an uploaded file
    Delete {
        #[arg(add = ArgValueCompleter::new(file_token_completer))]
        token: String,
    },
    /// Change the password, expiry or filename visibility of a file
    Modify {
        #[arg(add = ArgValueCompleter::new(file_token_completer))]
        token: String,
        #[arg(long)]
        password: Option<String>,
        /// Current password, required when changing an existing one
        #[arg(long)]
        previous_password: Option<String>,
        #[arg(long, value_parser = validate_expiry)]
        expiry: Option<String>,
        #[arg(long, value_name = "BOOL")]
        hide_filename: Option<bool>,
    },
    /// Download a file
    Download {
        identifier: String,
        /// Where to write the file, stdout if omitted
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Manage buckets
    #[command(subcommand)]
    Bucket(BucketCommands),
    /// Manage albums
    #[command(subcommand)]
    Album(AlbumCommands),
    /// Show the server's upload restrictions
    Restrictions,
    /// Configure wvault interactively
    Config,
    /// Store a bucket token in the OS keyring
    SetBucketToken { token: String },
    /// Remove the stored bucket token from the OS keyring
    ClearBucketToken,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wvault=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let _rt_guard = rt.enter();
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    let cli = Cli::parse();
    init_logging();

    rt.block_on(async {
        match cli.command {
            Commands::Config => interactive_config(),
            Commands::SetBucketToken { token } => {
                config::set_bucket_token_keyring(&token)?;
                element!(SuccessMessage(message: "Bucket token stored".to_string())).print();
                Ok(())
            }
            Commands::ClearBucketToken => {
                let message = if config::clear_bucket_token_keyring()? {
                    "Bucket token removed"
                } else {
                    "No bucket token was stored"
                };
                element!(SuccessMessage(message: message.to_string())).print();
                Ok(())
            }
            remote => {
                let config = config::read_config()?;
                let client = build_client(&config)?;

                match remote {
                    Commands::Upload(args) => upload(&config, client, args).await,
                    Commands::Info { token, raw, json } => file_info(&client, &token, raw, json).await,
                    Commands::Delete { token } => {
                        client.delete_file(&token).await?;
                        element!(SuccessMessage(message: format!("Deleted {}", token))).print();
                        Ok(())
                    }
                    Commands::Modify {
                        token,
                        password,
                        previous_password,
                        expiry,
                        hide_filename,
                    } => {
                        let request = ModifyEntryRequest {
                            password,
                            previous_password,
                            custom_expiry: expiry,
                            hide_filename,
                        };
                        modify_file(&client, &token, request).await
                    }
                    Commands::Download {
                        identifier,
                        output,
                        password,
                    } => {
                        let bytes = client.download_file(&identifier, password.as_deref()).await?;
                        write_output(output.as_deref(), &bytes)
                    }
                    Commands::Bucket(command) => bucket_command(&config, &client, command).await,
                    Commands::Album(command) => album_command(&config, &client, command).await,
                    Commands::Restrictions => {
                        let restrictions = client.restrictions().await?;
                        element!(RestrictionsView(restrictions: Some(restrictions))).print();
                        Ok(())
                    }
                    Commands::Config | Commands::SetBucketToken { .. } | Commands::ClearBucketToken => {
                        unreachable!("handled before the configuration is loaded")
                    }
                }
            }
        }
    })
}

fn build_client(config: &Config) -> Result<VaultClient> {
    let client = match config.request_timeout {
        Some(timeout) => VaultClient::with_timeout(config.base_url.clone(), timeout),
        None => VaultClient::new(config.base_url.clone()),
    };
    client.context("Failed to build HTTP client")
}

async fn upload(config: &Config, client: VaultClient, args: UploadArgs) -> Result<()> {
    let stdin_name = args.name.as_deref().unwrap_or(STDIN_DEFAULT_NAME);
    // The stdin copy is deleted when dropped, so it lives until the batch is done.
    let (mut selection, _stdin_copy) =
        collect_with_stdin(&args.paths, args.recursive, &mut io::stdin().lock(), stdin_name)
            .context("Failed to read the upload selection")?;

    if args.check {
        skip_oversized(&client, &mut selection).await?;
    }

    for skipped in &selection.skipped {
        element!(ErrorMessage(message: format!("Skipped {}: {}", skipped.path.display(), skipped.reason))).print();
    }

    if selection.files.is_empty() {
        bail!("No files to upload");
    }

    let mut batch = config.batch.clone();
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            bail!("--jobs must be at least 1");
        }
        batch.max_concurrent = jobs;
    }
    if args.strict {
        batch.partial_failure = PartialFailurePolicy::Strict;
    }

    let bucket_token = if args.no_bucket {
        None
    } else {
        args.bucket.or_else(|| config.bucket_token.clone())
    };

    let defaults = &config.upload_defaults;
    let options = UploadOptions {
        expiry: args.expires.or_else(|| defaults.expiry.clone()),
        hide_filename: args.hide_filename || defaults.hide_filename,
        password: args.password,
        one_time_download: args.one_time_download || defaults.one_time_download,
        bucket_token,
    };

    let total = selection.files.len();
    let title = match selection.files.as_slice() {
        [file] => format!("Uploading {} ({})", file.display_name, format_file_size(file.size_bytes)),
        _ => format!("Uploading {} files ({})", total, format_file_size(selection.total_bytes())),
    };

    let session = UploadSession::new(Arc::new(client), batch);
    session.update_options(options);
    let receiver = session.subscribe();

    let handle = session
        .submit(selection.files)
        .ok_or_else(|| anyhow!("No files to upload"))?;

    if !args.json && io::stdout().is_terminal() {
        element!(BatchProgress(title: title, state: Some(receiver)))
            .render_loop()
            .await?;
    }

    handle.await.context("Upload task failed")?;

    match session.current() {
        BatchUploadState::Success { all_files, .. } => {
            debug!(uploaded = all_files.len(), total, "upload finished");
            if args.json {
                return print_json(&all_files);
            }

            let failed = total - all_files.len();
            let errors = if failed > 0 {
                vec![format!("{} of {} files failed to upload", failed, total)]
            } else {
                Vec::new()
            };
            element!(UploadSummary(files: all_files, errors: errors)).print();
            Ok(())
        }
        BatchUploadState::Error { message, .. } => Err(anyhow!(message).context("Upload failed")),
        other => bail!("Upload ended in an unexpected state: {:?}", other),
    }
}

async fn skip_oversized(client: &VaultClient, selection: &mut Selection) -> Result<()> {
    let restrictions = client
        .restrictions()
        .await
        .context("Failed to fetch server restrictions")?;

    let Some(limit) = restrictions.max_file_size() else {
        return Ok(());
    };

    let skipped = &mut selection.skipped;
    selection.files.retain(|file| {
        if restrictions.exceeds_max_size(file.size_bytes) {
            skipped.push(SkippedPath {
                path: file.path.clone(),
                reason: format!("larger than the server limit of {}", format_file_size(limit)),
            });
            false
        } else {
            true
        }
    });

    Ok(())
}

async fn file_info(client: &VaultClient, token: &str, raw: bool, json: bool) -> Result<()> {
    let file = client.file_info(token, !raw).await?;
    if json {
        print_json(&file)
    } else {
        element!(FileDetails(file: Some(file))).print();
        Ok(())
    }
}

async fn modify_file(client: &VaultClient, token: &str, request: ModifyEntryRequest) -> Result<()> {
    if request.is_empty() {
        bail!("Nothing to modify, pass at least one of --password, --expiry or --hide-filename");
    }

    let file = client.modify_entry(token, &request).await?;
    element!(SuccessMessage(message: format!("Updated {}", token))).print();
    element!(FileDetails(file: Some(file))).print();
    Ok(())
}

async fn bucket_command(config: &Config, client: &VaultClient, command: BucketCommands) -> Result<()> {
    match command {
        BucketCommands::Create { save } => {
            let bucket = client.create_bucket().await?;
            if save {
                config::set_bucket_token_keyring(&bucket.token)?;
            }
            let suffix = if save { " and stored it in the keyring" } else { "" };
            element!(SuccessMessage(message: format!("Created bucket {}{}", bucket.token, suffix))).print();
            Ok(())
        }
        BucketCommands::Show { token } => {
            let token = bucket_or_stored(token, config)?;
            let bucket = client.get_bucket(&token).await?;
            element!(BucketView(bucket: Some(bucket))).print();
            Ok(())
        }
        BucketCommands::Delete { token } => {
            client.delete_bucket(&token).await?;
            if config.bucket_token.as_deref() == Some(token.as_str()) {
                config::clear_bucket_token_keyring()?;
            }
            element!(SuccessMessage(message: format!("Deleted bucket {}", token))).print();
            Ok(())
        }
    }
}

async fn album_command(config: &Config, client: &VaultClient, command: AlbumCommands) -> Result<()> {
    match command {
        AlbumCommands::Create { name, bucket } => {
            let bucket = bucket_or_stored(bucket, config)?;
            let album = client.create_album(&bucket, &name).await?;
            element!(AlbumView(album: Some(album), public_base_url: None)).print();
        }
        AlbumCommands::Show { token } => {
            let album = client.get_album(&token).await?;
            let public_base_url = Some(client.base_url().to_string());
            element!(AlbumView(album: Some(album), public_base_url: public_base_url)).print();
        }
        AlbumCommands::Delete { token, delete_files } => {
            client.delete_album(&token, delete_files).await?;
            element!(SuccessMessage(message: format!("Deleted album {}", token))).print();
        }
        AlbumCommands::Share { token } => {
            let album = client.share_album(&token).await?;
            let public_base_url = Some(client.base_url().to_string());
            element!(AlbumView(album: Some(album), public_base_url: public_base_url)).print();
        }
        AlbumCommands::Revoke { token } => {
            client.revoke_album(&token).await?;
            element!(SuccessMessage(message: format!("Revoked public access to {}", token))).print();
        }
        AlbumCommands::Add { token, files } => {
            let album = client.associate_files(&token, &files).await?;
            element!(AlbumView(album: Some(album), public_base_url: None)).print();
        }
        AlbumCommands::Remove { token, files } => {
            let album = client.disassociate_files(&token, &files).await?;
            element!(AlbumView(album: Some(album), public_base_url: None)).print();
        }
        AlbumCommands::Download {
            token,
            output,
            file_ids,
        } => {
            let bytes = client.download_album(&token, &file_ids).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.zip", token)));
            write_output(Some(&output), &bytes)?;
        }
    }
    Ok(())
}

fn bucket_or_stored(token: Option<String>, config: &Config) -> Result<String> {
    token.or_else(|| config.bucket_token.clone()).ok_or_else(|| {
        anyhow!("No bucket given and none stored, run `wvault set-bucket-token` or pass a token")
    })
}

fn write_output(output: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
            element!(SuccessMessage(message: format!(
                "Saved {} to {}",
                format_file_size(bytes.len() as u64),
                path.display()
            )))
            .print();
        }
        None => {
            let mut stdout = io::stdout().lock();
            if stdout.is_terminal() {
                bail!("Refusing to write binary data to a terminal, pass --output");
            }
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if !io::stdout().is_terminal() {
        println!("{}", json);
        return Ok(());
    }

    let output = highlight(
        &json,
        Options {
            formatter: FormatterOption::Terminal {
                theme: Some(themes::get("ayu_light").expect("Syntax highlighting theme not found")),
            },
            lang_or_file: Some("json"),
        },
    );
    println!("{}", output);
    Ok(())
}

/// Tokens from the stored bucket, for shell completion. Any failure yields no candidates.
fn stored_bucket_tokens(select: impl Fn(wvault::model::Bucket) -> Vec<String>) -> Vec<String> {
    let Ok(config) = config::read_config() else {
        return Vec::new();
    };
    let Some(bucket_token) = config.bucket_token.clone() else {
        return Vec::new();
    };
    let Ok(client) = build_client(&config) else {
        return Vec::new();
    };

    let handle = Handle::current();
    match handle.block_on(client.get_bucket(&bucket_token)) {
        Ok(bucket) => select(bucket),
        Err(_) => Vec::new(),
    }
}

fn completion_candidates(current: &std::ffi::OsStr, tokens: Vec<String>) -> Vec<CompletionCandidate> {
    let Some(current) = current.to_str() else {
        return vec![];
    };

    tokens
        .into_iter()
        .filter(|token| token.starts_with(current))
        .map(CompletionCandidate::new)
        .collect()
}

fn file_token_completer(current: &std::ffi::OsStr) -> Vec<CompletionCandidate> {
    let tokens = stored_bucket_tokens(|bucket| bucket.files.into_iter().map(|f| f.token).collect());
    completion_candidates(current, tokens)
}

fn album_token_completer(current: &std::ffi::OsStr) -> Vec<CompletionCandidate> {
    let tokens = stored_bucket_tokens(|bucket| bucket.albums.into_iter().map(|a| a.token).collect());
    completion_candidates(current, tokens)
}

fn read_input(prompt: &str, default: Option<&str>, description: Option<&str>) -> Result<String> {
    element! {
        InputPrompt(
            prompt: prompt.to_string(),
            default: default.map(|s| s.to_string()),
            description: description.map(|s| s.to_string())
        )
    }
    .print();

    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();

    if input.is_empty() {
        Ok(default.map(|d| d.to_string()).unwrap_or(input))
    } else {
        Ok(input)
    }
}

/// Repeats the prompt until `parse` accepts the answer. An empty answer means "unset".
fn read_validated<T>(
    prompt: &str,
    default: Option<&str>,
    description: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<Option<T>> {
    loop {
        let input = read_input(prompt, default, Some(description))?;
        if input.is_empty() {
            return Ok(None);
        }
        match parse(&input) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => {
                element!(ErrorMessage(message: e)).print();
                println!();
            }
        }
    }
}

fn parse_yes_no(input: &str) -> Result<bool, String> {
    match input.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" => Ok(true),
        "n" | "no" | "false" => Ok(false),
        other => Err(format!("Expected yes or no, got '{}'", other)),
    }
}

fn yes_no(value: Option<bool>) -> Option<&'static str> {
    value.map(|v| if v { "yes" } else { "no" })
}

fn interactive_config() -> Result<()> {
    element!(ConfigHeader()).print();

    let existing = config::read_config_file()?;

    let current_url = existing
        .base_url
        .as_ref()
        .map(|url| url.to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let base_url = read_validated(
        "WaifuVault URL",
        Some(&current_url),
        "The server to upload to",
        |input| Url::parse(input).map_err(|e| format!("Invalid URL: {}", e)),
    )?;

    let expires = read_validated(
        "Default expiry",
        existing.expires.as_deref(),
        "Optional: how long uploads are kept, e.g. 30m, 12h or 7d",
        validate_expiry,
    )?;

    let hide_filename = read_validated(
        "Hide filenames",
        yes_no(existing.hide_filename),
        "Optional: hide original filenames in upload URLs (yes/no)",
        parse_yes_no,
    )?;

    let one_time_download = read_validated(
        "One-time downloads",
        yes_no(existing.one_time_download),
        "Optional: delete uploads after their first download (yes/no)",
        parse_yes_no,
    )?;

    let current_jobs = existing.max_concurrent_uploads.map(|jobs| jobs.to_string());
    let max_concurrent_uploads = read_validated(
        "Concurrent uploads",
        current_jobs.as_deref(),
        "Optional: how many files of a batch upload at once",
        |input| match input.parse::<usize>() {
            Ok(0) | Err(_) => Err("Expected a number of at least 1".to_string()),
            Ok(jobs) => Ok(jobs),
        },
    )?;

    let strict_batch = read_validated(
        "Strict batches",
        yes_no(existing.strict_batch),
        "Optional: fail a batch when any of its files fails (yes/no)",
        parse_yes_no,
    )?;

    let request_timeout = read_validated(
        "Request timeout",
        existing.request_timeout.as_deref(),
        "Optional: give up on requests after this long, e.g. 5m",
        |input| {
            humantime::parse_duration(input)
                .map(|_| input.to_string())
                .map_err(|e| format!("Invalid duration: {}", e))
        },
    )?;

    let bucket_token = read_input(
        "Bucket token",
        None,
        Some("Optional: upload into this bucket by default (stored in the OS keyring)"),
    )?;
    if !bucket_token.is_empty() {
        config::set_bucket_token_keyring(&bucket_token)?;
    }

    let config_file = ConfigFile {
        base_url,
        expires,
        hide_filename,
        one_time_download,
        max_concurrent_uploads,
        strict_batch,
        request_timeout,
    };

    let path = config::write_config(&config_file)?;

    element!(SuccessMessage(message: format!("Configuration saved to {}", path.display()))).print();

    Ok(())
}
