#![forbid(unsafe_code)]

//! prokctl: command-line client for the prok professional-networking API.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use prok_client::{
    ClientConfig, CollectionLoader, FileCredentialStore, Listing, PostDraft, ProkApi,
    RequestClient, Session, SessionStatus, Upload,
};
use prok_core::{Filters, ItemId, LoaderPhase, Record};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "prokctl", version, about = "Client for the prok networking API")]
struct Args {
    /// Config file (defaults to ~/.prok/prok.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API base URL; overrides the config file and PROK_API_URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log level (env-filter syntax).
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Log in and store the bearer token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account.
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored token.
    Logout,
    /// Show the stored identity.
    Whoami,
    Posts {
        #[command(subcommand)]
        cmd: PostsCmd,
    },
    /// Personal feed.
    Feed,
    Jobs {
        #[command(subcommand)]
        cmd: JobsCmd,
    },
    Profile {
        #[command(subcommand)]
        cmd: ProfileCmd,
    },
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long)]
    category: Option<String>,
    /// any | public | private
    #[arg(long, default_value = "any")]
    visibility: String,
    #[arg(long)]
    tag: Option<String>,
    /// created_at | likes | views
    #[arg(long, default_value = "created_at")]
    sort: String,
    #[arg(long)]
    page_size: Option<u32>,
    /// Number of pages to load.
    #[arg(long, default_value_t = 1)]
    pages: u32,
    /// Load every page.
    #[arg(long)]
    all: bool,
}

#[derive(Subcommand, Debug)]
enum PostsCmd {
    List(ListArgs),
    Get { id: String },
    Like { id: String },
    Delete { id: String },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        private: bool,
        #[arg(long)]
        no_comments: bool,
        /// Image or video to attach.
        #[arg(long)]
        media: Option<PathBuf>,
    },
    Categories,
    Tags,
}

#[derive(Subcommand, Debug)]
enum JobsCmd {
    List(ListArgs),
    Get { id: String },
    Apply { id: String },
}

#[derive(Subcommand, Debug)]
enum ProfileCmd {
    Show,
    /// Replace profile fields from a JSON file.
    Update { file: PathBuf },
    UploadImage { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
    /// Print the effective configuration.
    Show,
    /// Write the effective configuration to the config file.
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = args.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = match load_config(&config_path, args.api_url.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let session = Session::new(FileCredentialStore::new(config.credentials_path()));

    let result = run(args.cmd, &config, &config_path, session.clone()).await;
    if session.status() == SessionStatus::Expired {
        eprintln!("session expired; run `prokctl login` again");
        return ExitCode::from(2);
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &std::path::Path, api_url: Option<&str>) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::load_or_default(path)
        .with_context(|| format!("load config {}", path.display()))?;
    if let Some(url) = api_url {
        config.base_url = url.to_string();
    }
    Ok(config)
}

async fn run(
    cmd: Cmd,
    config: &ClientConfig,
    config_path: &std::path::Path,
    session: Session,
) -> anyhow::Result<()> {
    let client = RequestClient::from_config(config, session.clone()).context("build client")?;
    let api = ProkApi::new(Arc::new(client));

    match cmd {
        Cmd::Login { email, password } => {
            let credential = api.login(&email, &password).await?;
            print_json(&credential.user)?;
        }
        Cmd::Signup {
            username,
            email,
            password,
        } => print_json(&api.signup(&username, &email, &password).await?)?,
        Cmd::Logout => api.logout()?,
        Cmd::Whoami => match session.credential()? {
            Some(credential) => print_json(&credential.user)?,
            None => anyhow::bail!("not logged in"),
        },
        Cmd::Posts { cmd } => match cmd {
            PostsCmd::List(list) => print_listing(api.posts(), list, config).await?,
            PostsCmd::Get { id } => print_json(&api.get_post(&ItemId::from(id.as_str())).await?)?,
            PostsCmd::Like { id } => print_json(&api.like_post(&ItemId::from(id.as_str())).await?)?,
            PostsCmd::Delete { id } => {
                print_json(&api.delete_post(&ItemId::from(id.as_str())).await?)?
            }
            PostsCmd::Create {
                title,
                content,
                category,
                tags,
                private,
                no_comments,
                media,
            } => {
                let mut draft = PostDraft::new(title, content);
                draft.category = category;
                draft.tags = tags;
                draft.is_public = !private;
                draft.allow_comments = !no_comments;
                if let Some(path) = media {
                    draft.media = Some(read_upload(&path).await?);
                }
                print_json(&api.create_post(draft).await?)?;
            }
            PostsCmd::Categories => print_json(&api.categories().await?)?,
            PostsCmd::Tags => print_json(&api.popular_tags().await?)?,
        },
        Cmd::Feed => print_json(&api.feed().await?)?,
        Cmd::Jobs { cmd } => match cmd {
            JobsCmd::List(list) => print_listing(api.jobs(), list, config).await?,
            JobsCmd::Get { id } => print_json(&api.get_job(&ItemId::from(id.as_str())).await?)?,
            JobsCmd::Apply { id } => {
                print_json(&api.apply_for_job(&ItemId::from(id.as_str())).await?)?
            }
        },
        Cmd::Profile { cmd } => match cmd {
            ProfileCmd::Show => print_json(&api.profile().await?)?,
            ProfileCmd::Update { file } => {
                let bytes = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("read {}", file.display()))?;
                let profile: Value = serde_json::from_slice(&bytes).context("parse profile json")?;
                print_json(&api.update_profile(profile).await?)?;
            }
            ProfileCmd::UploadImage { file } => {
                let url = api.upload_profile_image(read_upload(&file).await?).await?;
                println!("{url}");
            }
        },
        Cmd::Config { cmd } => match cmd {
            ConfigCmd::Show => print!("{}", config.to_toml()?),
            ConfigCmd::Init => {
                config
                    .save_to(config_path)
                    .with_context(|| format!("write {}", config_path.display()))?;
                eprintln!("wrote {}", config_path.display());
            }
        },
    }
    Ok(())
}

/// Loads `--pages` pages (or all) through the collection loader, the same
/// way an infinite-scroll view would.
async fn print_listing(source: Listing, list: ListArgs, config: &ClientConfig) -> anyhow::Result<()> {
    let filters = Filters {
        search: list.search,
        category: list.category,
        visibility: list.visibility.parse()?,
        tag: list.tag,
        sort: list.sort.parse()?,
    };
    let page_size = list.page_size.unwrap_or(config.page_size);
    let handle = CollectionLoader::<Record>::new(Arc::new(source), page_size)
        .with_filters(filters)
        .with_debounce(config.debounce())
        .spawn()?;

    let mut pages = 1;
    let mut state = handle
        .settled()
        .await
        .context("loader stopped unexpectedly")?;
    while state.phase() != LoaderPhase::Error
        && state.has_more()
        && (list.all || pages < list.pages)
    {
        state = handle
            .load_next()
            .await
            .context("loader stopped unexpectedly")?;
        pages += 1;
    }
    handle.unmount().await;

    if let Some(err) = state.error() {
        if state.items().is_empty() {
            return Err(err.clone().into());
        }
        tracing::warn!(error = %err, "listing incomplete");
    }
    print_json(&state.items())
}

async fn read_upload(path: &std::path::Path) -> anyhow::Result<Upload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;
    Ok(Upload { file_name, bytes })
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
