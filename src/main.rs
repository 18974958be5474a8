mod api;
mod auth;
mod certificate;
mod config;
mod constants;
mod credentials;
mod forms;
mod list;
mod query;
mod records;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::ApiClient;
use crate::auth::AuthContext;
use crate::config::Config;
use crate::constants::ROW_HEIGHT_PX;
use crate::credentials::TokenStore;
use crate::forms::{AgencyApplication, BlogDraft, Dashboard, Draft, DraftKind, EventDraft};
use crate::list::{ListSession, Rect, SortKey, ViewStatus, project_local};
use crate::query::QueryClient;
use crate::records::{Agency, Blog, Certificate, Event, Member, News, Record, Resource};

fn setup_logging() {
    use std::fs::OpenOptions;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,roster=debug"));

    let log_file = Config::config_dir()
        .ok()
        .and_then(|dir| fs::create_dir_all(&dir).ok().map(|_| dir.join("roster.log")))
        .and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()
        });

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        // Fallback to stderr if file logging fails
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "Browse and manage a study-abroad directory from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configuration file
    Setup,

    /// Store the API token used for dashboard actions
    Login {
        /// Show where the token is stored instead of prompting
        #[arg(long)]
        status: bool,

        /// Forget the stored token
        #[arg(long, conflicts_with = "status")]
        logout: bool,
    },

    /// List a resource page by page
    #[command(visible_alias = "ls")]
    List {
        /// agencies, members, blogs, events, news or certificates
        resource: Resource,

        /// Search term sent to the server (or matched locally with --file)
        #[arg(short, long, default_value = "")]
        search: String,

        /// default, name-asc or name-desc
        #[arg(long, default_value = "default")]
        sort: SortKey,

        /// How many pages to scroll through
        #[arg(short, long, default_value_t = 1)]
        pages: u32,

        /// Filter a local JSON array instead of querying the API
        #[arg(long)]
        file: Option<PathBuf>,

        /// Show summaries and images under each row
        #[arg(short, long)]
        long: bool,
    },

    /// Check a certificate code
    Verify {
        code: String,
    },

    /// Write the verification QR code of a certificate as SVG
    Qr {
        code: String,

        /// Output file (default: <code>.svg)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Open the written file
        #[arg(long)]
        open: bool,
    },

    /// Submit a form: agency, blog or event, followed by key=value fields
    Submit {
        kind: DraftKind,

        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// Approve a pending record
    Approve {
        resource: Resource,
        id: String,
    },

    /// Delete a record
    Delete {
        resource: Resource,
        id: String,
    },
}

fn prompt(label: &str, default: &str) -> Result<String> {
    use std::io::{self, Write};

    print!("{} [{}]: ", label, default);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();
    Ok(if input.is_empty() {
        default.to_string()
    } else {
        input.to_string()
    })
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    rest.is_some_and(|host| !host.is_empty() && !host.starts_with('/'))
}

fn run_setup() -> Result<()> {
    use std::io::{self, Write};

    println!("Roster Setup");
    println!("============\n");

    let config_path = Config::config_path()?;
    if config_path.exists() {
        print!("Configuration already exists. Overwrite? [y/N]: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }
    }

    let mut config = Config::default();

    config.api.base_url = loop {
        let url = prompt("API base URL", &config.api.base_url)?;
        if is_http_url(&url) {
            break url;
        }
        println!("Invalid URL. Please enter an http(s) URL (e.g., https://example.org/api)");
    };

    config.api.site_url = loop {
        let url = prompt("Public site URL", &config.api.site_url)?;
        if is_http_url(&url) {
            break url;
        }
        println!("Invalid URL. Please enter an http(s) URL (e.g., https://example.org)");
    };

    config.ensure_dirs()?;
    config.save()?;
    println!("Configuration saved to {}", config_path.display());
    println!("\nSetup complete! Run 'roster list agencies' to start.");
    Ok(())
}

fn read_secret() -> Result<String> {
    use std::io;

    let _guard = DisableEcho::new()?;

    let mut secret = String::new();
    io::stdin().read_line(&mut secret)?;
    Ok(secret.trim().to_string())
}

struct DisableEcho {
    #[cfg(unix)]
    original: libc::termios,
}

impl DisableEcho {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use std::mem::MaybeUninit;
        use std::os::unix::io::AsRawFd;

        let fd = std::io::stdin().as_raw_fd();
        let mut termios = MaybeUninit::<libc::termios>::uninit();

        unsafe {
            if libc::tcgetattr(fd, termios.as_mut_ptr()) != 0 {
                anyhow::bail!("Failed to get terminal attributes");
            }
            let original = termios.assume_init();
            let mut new = original;
            new.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(fd, libc::TCSANOW, &new) != 0 {
                anyhow::bail!("Failed to set terminal attributes");
            }
            Ok(Self { original })
        }
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }
}

#[cfg(unix)]
impl Drop for DisableEcho {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        let fd = std::io::stdin().as_raw_fd();
        unsafe {
            libc::tcsetattr(fd, libc::TCSANOW, &self.original);
        }
    }
}

async fn run_login(config: &Config, status: bool, logout: bool) -> Result<()> {
    use std::io::{self, Write};

    let store = TokenStore::new(&config.api.base_url);
    if status {
        println!("{}", store.status());
        return Ok(());
    }
    if logout {
        store.delete_token()?;
        println!("Token removed.");
        return Ok(());
    }

    print!("API token: ");
    io::stdout().flush()?;
    let token = read_secret()?;
    println!();

    let api = ApiClient::new(&config.api, Some(token.clone()))?;
    let auth = AuthContext::resolve(&api, token.clone())
        .await
        .context("Token rejected by the server")?;
    store.set_token(&token)?;

    println!(
        "Signed in as {} ({:?}).",
        auth.user_name().unwrap_or("unknown user"),
        auth.user.as_ref().map(|u| u.role).unwrap_or_default()
    );
    Ok(())
}

/// Sign in with the stored token, for commands that need a user.
async fn signed_in(config: &Config) -> Result<(ApiClient, AuthContext)> {
    let token = TokenStore::new(&config.api.base_url).get_token()?;
    let api = ApiClient::new(&config.api, Some(token.clone()))?;
    let auth = AuthContext::resolve(&api, token)
        .await
        .context("Failed to resolve the signed-in user")?;
    Ok((api, auth))
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

/// How `roster list` was asked to present results
#[derive(Debug, Clone, Copy)]
struct ListOptions {
    sort: SortKey,
    pages: u32,
    long: bool,
}

fn list_local<R: Record>(path: &Path, search: &str, options: ListOptions) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let items: Vec<R> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a list of {}", path.display(), R::RESOURCE))?;

    let view = project_local(&items, search, options.sort);
    let status = if view.is_empty() {
        ViewStatus::Empty
    } else {
        ViewStatus::Ready(list::LoaderIndicator::Hidden)
    };
    print_lines(&render::render_view(&view, &status, options.long));
    Ok(())
}

/// Scroll to the bottom once per extra page; each scroll that brings the
/// sentinel into view loads the next page.
async fn scroll_pages<R: Record>(
    session: &mut ListSession<ApiClient, R>,
    config: &Config,
    pages: u32,
) {
    session.settle_fetches().await;

    let viewport_height = f64::from(config.list.viewport_rows) * ROW_HEIGHT_PX;
    for _ in 1..pages.max(1) {
        session.wait_settled().await;
        let content_height = session.state().items().len() as f64 * ROW_HEIGHT_PX;
        let viewport = Rect::new((content_height - viewport_height).max(0.0), viewport_height);
        if !session.scroll_to(viewport) {
            break;
        }
        session.settle_fetches().await;
    }
}

fn confirm(label: &str) -> Result<bool> {
    let answer = prompt(&format!("{} (y/n)", label), "n")?;
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

async fn list_remote<R: Record>(
    config: &Config,
    api: ApiClient,
    search: &str,
    options: ListOptions,
) -> Result<()> {
    use std::io::IsTerminal;

    let client: QueryClient<ApiClient, R> = QueryClient::new(Arc::new(api), &config.cache);
    let mut session = ListSession::new(client, &config.list);
    session.set_sort(options.sort);

    if search.trim().is_empty() {
        session.start();
    } else {
        session.set_search(search.trim());
    }

    loop {
        scroll_pages(&mut session, config, options.pages).await;
        print_lines(&render::render_view(
            &session.view(),
            &session.status(),
            options.long,
        ));

        let Some(query) = session.query_state().await else {
            break;
        };
        if !query.is_error {
            break;
        }
        if let Some(e) = &query.error {
            eprintln!("error: {}", e);
        }
        if !std::io::stdin().is_terminal() || !confirm("Retry?")? {
            break;
        }
        tracing::info!("Retrying {} listing from page 1", R::RESOURCE);
        session.reload();
    }

    if let Some(total) = session.state().total()
        && !session.state().items().is_empty()
    {
        let matching = match session.state().search() {
            "" => String::new(),
            term => format!(" matching '{}'", term),
        };
        println!(
            "\nShowing {} of {} {}{}",
            session.state().items().len(),
            total,
            R::RESOURCE,
            matching
        );
    }
    Ok(())
}

async fn run_list(
    config: &Config,
    resource: Resource,
    search: &str,
    file: Option<PathBuf>,
    options: ListOptions,
) -> Result<()> {
    if let Some(path) = file {
        return match resource {
            Resource::Agencies => list_local::<Agency>(&path, search, options),
            Resource::Members => list_local::<Member>(&path, search, options),
            Resource::Blogs => list_local::<Blog>(&path, search, options),
            Resource::Events => list_local::<Event>(&path, search, options),
            Resource::News => list_local::<News>(&path, search, options),
            Resource::Certificates => list_local::<Certificate>(&path, search, options),
        };
    }

    let token = TokenStore::new(&config.api.base_url).token();
    let api = ApiClient::new(&config.api, token)?;
    tracing::debug!("Listing {} (signed in: {})", resource, api.has_token());
    match resource {
        Resource::Agencies => list_remote::<Agency>(config, api, search, options).await,
        Resource::Members => list_remote::<Member>(config, api, search, options).await,
        Resource::Blogs => list_remote::<Blog>(config, api, search, options).await,
        Resource::Events => list_remote::<Event>(config, api, search, options).await,
        Resource::News => list_remote::<News>(config, api, search, options).await,
        Resource::Certificates => {
            list_remote::<Certificate>(config, api, search, options).await
        }
    }
}

async fn run_verify(config: &Config, code: &str) -> Result<()> {
    let api = ApiClient::new(&config.api, None)?;
    let verification = certificate::verify(&api, code).await?;
    print_lines(&render::render_verification(code, &verification));
    println!(
        "  Verify online: {}",
        certificate::verification_url(&config.api.site_url, code)?
    );
    Ok(())
}

/// `{code}.svg` in the working directory, with path separators and other
/// unusual characters replaced.
fn default_qr_path(code: &str) -> PathBuf {
    let name: String = code
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    PathBuf::from(format!("{}.svg", name))
}

fn run_qr(config: &Config, code: &str, out: Option<PathBuf>, open: bool) -> Result<()> {
    let url = certificate::verification_url(&config.api.site_url, code)?;
    let path = out.unwrap_or_else(|| default_qr_path(code));
    certificate::save_qr_svg(&url, &config.qr, &path)?;
    println!("QR code for {} written to {}", url, path.display());

    if open {
        open::that(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    }
    Ok(())
}

async fn run_submit(config: &Config, kind: DraftKind, args: &[String]) -> Result<()> {
    let (api, auth) = signed_in(config).await?;
    let fields = forms::parse_fields(args)?;
    let dashboard = Dashboard::new(api, auth);

    let created = match kind {
        DraftKind::Agency => {
            let draft = AgencyApplication::build(dashboard.auth(), fields)?;
            dashboard.submit(&draft).await?
        }
        DraftKind::Blog => {
            let draft = BlogDraft::build(dashboard.auth(), fields)?;
            dashboard.submit(&draft).await?
        }
        DraftKind::Event => {
            let draft = EventDraft::build(dashboard.auth(), fields)?;
            dashboard.submit(&draft).await?
        }
    };

    let id = created
        .get("id")
        .map(|id| id.to_string())
        .unwrap_or_else(|| "?".to_string());
    println!("Submitted (id {}); it will appear once approved.", id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    if let Commands::Setup = cli.command {
        return run_setup();
    }

    let config = Config::load()?;

    match cli.command {
        Commands::Setup => Ok(()),
        Commands::Login { status, logout } => run_login(&config, status, logout).await,
        Commands::List {
            resource,
            search,
            sort,
            pages,
            file,
            long,
        } => {
            let options = ListOptions { sort, pages, long };
            run_list(&config, resource, &search, file, options).await
        }
        Commands::Verify { code } => run_verify(&config, &code).await,
        Commands::Qr { code, out, open } => run_qr(&config, &code, out, open),
        Commands::Submit { kind, fields } => run_submit(&config, kind, &fields).await,
        Commands::Approve { resource, id } => {
            let (api, auth) = signed_in(&config).await?;
            Dashboard::new(api, auth).approve(resource, &id).await?;
            println!("Approved {} {}.", resource, id);
            Ok(())
        }
        Commands::Delete { resource, id } => {
            let (api, auth) = signed_in(&config).await?;
            Dashboard::new(api, auth).delete(resource, &id).await?;
            println!("Deleted {} {}.", resource, id);
            Ok(())
        }
    }
}
