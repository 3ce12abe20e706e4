//! CLI commands

use anyhow::{Context, Result, bail};
use apimart_client::{ApiClient, SessionCache, paginate};
use apimart_core::{
    ApiListing, ClientSettings, CreateApiRequest, CreateEndpointRequest, Endpoint, HttpMethod,
    Language, ListQuery, Page, PreferencesStore, Pricing, Theme, UpdateApiRequest,
    UpdateEndpointRequest,
};
use clap::{Args, Subcommand};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::info;

use crate::config;
use crate::output;

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with an ID token issued by the identity provider
    Login {
        #[arg(long, env = "APIMART_ID_TOKEN", hide_env_values = true)]
        id_token: String,
    },

    /// Sign out and forget stored tokens
    Logout,

    /// Show the signed-in user
    Whoami {
        /// Bypass the cached user
        #[arg(long)]
        refresh: bool,

        /// Print the raw user record
        #[arg(long)]
        json: bool,
    },

    /// Browse and manage API listings
    Apis {
        #[command(subcommand)]
        command: ApiCommands,
    },

    /// Manage the endpoints of an API listing
    Endpoints {
        #[command(subcommand)]
        command: EndpointCommands,
    },

    /// Review submitted listings (administrators only)
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Language and theme preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },

    /// Generate a settings file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Paging options shared by list commands
#[derive(Args, Clone, Debug)]
pub struct ListArgs {
    /// Page number, starting at 1
    #[arg(long)]
    page: Option<u32>,

    /// Items per page
    #[arg(long)]
    page_size: Option<u32>,

    /// Fetch every page
    #[arg(long, conflicts_with = "page")]
    all: bool,
}

impl ListArgs {
    fn query(&self) -> ListQuery {
        ListQuery {
            page: self.page,
            page_size: self.page_size,
            ..ListQuery::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct PricingArgs {
    /// Price per call; omit for a free API
    #[arg(long)]
    price: Option<Decimal>,
}

impl PricingArgs {
    fn pricing(&self) -> Option<Pricing> {
        self.price.map(|price_per_call| {
            if price_per_call.is_zero() {
                Pricing::Free
            } else {
                Pricing::Paid { price_per_call }
            }
        })
    }
}

#[derive(Subcommand)]
pub enum ApiCommands {
    /// Browse published APIs
    List {
        #[command(flatten)]
        list: ListArgs,

        /// Search term
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Show one API
    Show { id: String },

    /// Create a draft listing
    Create {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        base_url: String,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        documentation_url: Option<String>,

        #[command(flatten)]
        pricing: PricingArgs,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Edit a draft or rejected listing
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        base_url: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        documentation_url: Option<String>,

        #[command(flatten)]
        pricing: PricingArgs,

        /// Comma-separated tags, replacing the current ones
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },

    /// Delete a listing
    Delete { id: String },

    /// Submit a listing for review
    Submit { id: String },

    /// List your own listings
    Mine {
        #[command(flatten)]
        list: ListArgs,
    },
}

#[derive(Subcommand)]
pub enum EndpointCommands {
    /// List the endpoints of an API
    List {
        api_id: String,

        #[command(flatten)]
        list: ListArgs,
    },

    /// Show one endpoint
    Show { api_id: String, id: String },

    /// Add an endpoint
    Add {
        api_id: String,

        #[arg(long)]
        name: String,

        #[arg(long, default_value = "GET")]
        method: HttpMethod,

        /// Path relative to the API base URL, e.g. /v1/forecast
        #[arg(long)]
        path: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Edit an endpoint
    Update {
        api_id: String,
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        method: Option<HttpMethod>,

        #[arg(long)]
        path: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Remove an endpoint
    Remove { api_id: String, id: String },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Listings waiting for review
    Pending {
        #[command(flatten)]
        list: ListArgs,
    },

    /// Approve a listing
    Approve { id: String },

    /// Reject a listing
    Reject {
        id: String,

        /// Shown to the listing owner
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Show current preferences
    Show,

    /// Change preferences
    Set {
        #[arg(long)]
        language: Option<Language>,

        #[arg(long)]
        theme: Option<Theme>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the effective settings to a file
    Init {
        /// Output file path (defaults to config.json in the state directory)
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Everything a command needs, built from settings
struct App {
    client: ApiClient,
    session: SessionCache,
}

impl App {
    fn new(settings: &ClientSettings, preferences: &PreferencesStore) -> Result<Self> {
        let language = preferences
            .load()
            .context("Failed to read preferences")?
            .language;
        let client = ApiClient::from_settings(settings)
            .language(language)
            .build()
            .context("Failed to create API client")?;
        let session = SessionCache::from_settings(client.clone(), settings);
        Ok(Self { client, session })
    }
}

impl Commands {
    pub async fn execute(self, settings: ClientSettings) -> Result<()> {
        let preferences = PreferencesStore::in_dir(&settings.state_dir);
        let app = || App::new(&settings, &preferences);

        match self {
            Commands::Login { id_token } => {
                let response = app()?
                    .client
                    .auth()
                    .login(&id_token)
                    .await
                    .context("Login failed")?;
                match response.user {
                    Some(user) => println!("Signed in as {}", user.display_label()),
                    None => println!("Signed in"),
                }
                Ok(())
            }
            Commands::Logout => {
                let app = app()?;
                app.client.auth().logout().await.context("Logout failed")?;
                app.session.invalidate();
                println!("Signed out");
                Ok(())
            }
            Commands::Whoami { refresh, json } => {
                let user = app()?
                    .session
                    .refresh_user(refresh)
                    .await
                    .context("Failed to fetch the current user")?;
                match user {
                    Some(user) if json => output::print_json(&user),
                    Some(user) => {
                        output::print_user(&user);
                        Ok(())
                    }
                    None => bail!("Not signed in; run `apimart login` first"),
                }
            }
            Commands::Apis { command } => command.execute(&app()?.client).await,
            Commands::Endpoints { command } => command.execute(&app()?.client).await,
            Commands::Admin { command } => command.execute(&app()?.client).await,
            Commands::Prefs { command } => command.execute(&preferences),
            Commands::Config { command } => command.execute(&settings),
        }
    }
}

/// Print one page, or every page when `--all` is set
async fn list_listings<F, Fut>(list: &ListArgs, query: ListQuery, fetch: F) -> Result<()>
where
    F: FnMut(ListQuery) -> Fut,
    Fut: Future<Output = Result<Page<ApiListing>, apimart_client::ClientError>>,
{
    if list.all {
        let items: Vec<ApiListing> = paginate(query, fetch)
            .try_collect()
            .await
            .context("Failed to list APIs")?;
        output::print_listings(&items);
    } else {
        let mut fetch = fetch;
        let page = fetch(query).await.context("Failed to list APIs")?;
        output::print_page(&page, output::print_listings);
    }
    Ok(())
}

impl ApiCommands {
    async fn execute(self, client: &ApiClient) -> Result<()> {
        let apis = client.apis();

        match self {
            ApiCommands::List {
                list,
                search,
                category,
            } => {
                let query = ListQuery {
                    search,
                    category,
                    ..list.query()
                };
                list_listings(&list, query, |q| {
                    let apis = apis.clone();
                    async move { apis.list(&q).await }
                })
                .await
            }
            ApiCommands::Mine { list } => {
                list_listings(&list, list.query(), |q| {
                    let apis = apis.clone();
                    async move { apis.list_mine(&q).await }
                })
                .await
            }
            ApiCommands::Show { id } => {
                let api = apis
                    .get(&id)
                    .await
                    .with_context(|| format!("Failed to fetch API {id}"))?;
                output::print_json(&api)
            }
            ApiCommands::Create {
                name,
                description,
                base_url,
                category,
                documentation_url,
                pricing,
                tags,
            } => {
                let request = CreateApiRequest {
                    name,
                    description,
                    category,
                    base_url,
                    documentation_url,
                    pricing: pricing.pricing().unwrap_or_default(),
                    tags,
                };
                let api = apis.create(&request).await.context("Failed to create API")?;
                println!("Created {} ({})", api.name, api.id);
                Ok(())
            }
            ApiCommands::Update {
                id,
                name,
                description,
                base_url,
                category,
                documentation_url,
                pricing,
                tags,
            } => {
                let request = UpdateApiRequest {
                    name,
                    description,
                    category,
                    base_url,
                    documentation_url,
                    pricing: pricing.pricing(),
                    tags,
                };
                let api = apis
                    .update(&id, &request)
                    .await
                    .with_context(|| format!("Failed to update API {id}"))?;
                println!("Updated {} ({})", api.name, api.id);
                Ok(())
            }
            ApiCommands::Delete { id } => {
                apis.delete(&id)
                    .await
                    .with_context(|| format!("Failed to delete API {id}"))?;
                println!("Deleted {id}");
                Ok(())
            }
            ApiCommands::Submit { id } => {
                let api = apis
                    .submit_for_review(&id)
                    .await
                    .with_context(|| format!("Failed to submit API {id}"))?;
                println!("{} is now {}", api.name, api.status);
                Ok(())
            }
        }
    }
}

impl EndpointCommands {
    async fn execute(self, client: &ApiClient) -> Result<()> {
        let endpoints = client.endpoints();

        match self {
            EndpointCommands::List { api_id, list } => {
                if list.all {
                    let items: Vec<Endpoint> = paginate(list.query(), |q| {
                        let endpoints = endpoints.clone();
                        let api_id = api_id.clone();
                        async move { endpoints.list(&api_id, &q).await }
                    })
                    .try_collect()
                    .await
                    .context("Failed to list endpoints")?;
                    output::print_endpoints(&items);
                } else {
                    let page = endpoints
                        .list(&api_id, &list.query())
                        .await
                        .context("Failed to list endpoints")?;
                    output::print_page(&page, output::print_endpoints);
                }
                Ok(())
            }
            EndpointCommands::Show { api_id, id } => {
                let endpoint = endpoints
                    .get(&api_id, &id)
                    .await
                    .with_context(|| format!("Failed to fetch endpoint {id}"))?;
                output::print_json(&endpoint)
            }
            EndpointCommands::Add {
                api_id,
                name,
                method,
                path,
                description,
            } => {
                let request = CreateEndpointRequest {
                    name,
                    method,
                    path,
                    description,
                    ..CreateEndpointRequest::default()
                };
                let endpoint = endpoints
                    .create(&api_id, &request)
                    .await
                    .context("Failed to add endpoint")?;
                println!("Added {} {} ({})", endpoint.method, endpoint.path, endpoint.id);
                Ok(())
            }
            EndpointCommands::Update {
                api_id,
                id,
                name,
                method,
                path,
                description,
            } => {
                let request = UpdateEndpointRequest {
                    name,
                    method,
                    path,
                    description,
                    ..UpdateEndpointRequest::default()
                };
                let endpoint = endpoints
                    .update(&api_id, &id, &request)
                    .await
                    .with_context(|| format!("Failed to update endpoint {id}"))?;
                println!("Updated {} {}", endpoint.method, endpoint.path);
                Ok(())
            }
            EndpointCommands::Remove { api_id, id } => {
                endpoints
                    .delete(&api_id, &id)
                    .await
                    .with_context(|| format!("Failed to remove endpoint {id}"))?;
                println!("Removed {id}");
                Ok(())
            }
        }
    }
}

impl AdminCommands {
    async fn execute(self, client: &ApiClient) -> Result<()> {
        let admin = client.admin();

        match self {
            AdminCommands::Pending { list } => {
                list_listings(&list, list.query(), |q| {
                    let admin = admin.clone();
                    async move { admin.list_pending(&q).await }
                })
                .await
            }
            AdminCommands::Approve { id } => {
                let api = admin
                    .approve(&id)
                    .await
                    .with_context(|| format!("Failed to approve API {id}"))?;
                info!(id = %api.id, "Approved");
                println!("Approved {}", api.name);
                Ok(())
            }
            AdminCommands::Reject { id, reason } => {
                let api = admin
                    .reject(&id, &reason)
                    .await
                    .with_context(|| format!("Failed to reject API {id}"))?;
                info!(id = %api.id, "Rejected");
                println!("Rejected {}", api.name);
                Ok(())
            }
        }
    }
}

impl PrefsCommands {
    fn execute(self, store: &PreferencesStore) -> Result<()> {
        match self {
            PrefsCommands::Show => {
                let preferences = store.load().context("Failed to read preferences")?;
                output::print_preferences(&preferences);
                Ok(())
            }
            PrefsCommands::Set { language, theme } => {
                if language.is_none() && theme.is_none() {
                    bail!("Nothing to change; pass --language and/or --theme");
                }
                let preferences = store
                    .update(|prefs| {
                        if let Some(language) = language {
                            prefs.language = language;
                        }
                        if let Some(theme) = theme {
                            prefs.theme = theme;
                        }
                    })
                    .context("Failed to save preferences")?;
                output::print_preferences(&preferences);
                Ok(())
            }
        }
    }
}

impl ConfigCommands {
    fn execute(self, settings: &ClientSettings) -> Result<()> {
        match self {
            ConfigCommands::Init { output, force } => {
                let path = output.unwrap_or_else(|| config::default_config_path(settings));
                config::write_settings(settings, &path, force)?;
                println!("Settings written to {}", path.display());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn parses_nested_commands() {
        let cli = TestCli::try_parse_from([
            "apimart", "endpoints", "add", "api-1", "--name", "Forecast", "--method", "post",
            "--path", "/forecast",
        ])
        .unwrap();
        match cli.command {
            Commands::Endpoints {
                command: EndpointCommands::Add { method, path, .. },
            } => {
                assert_eq!(method, HttpMethod::Post);
                assert_eq!(path, "/forecast");
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn zero_price_means_free() {
        let free = PricingArgs {
            price: Some(Decimal::ZERO),
        };
        assert_eq!(free.pricing(), Some(Pricing::Free));
        assert_eq!(PricingArgs { price: None }.pricing(), None);
    }

    #[test]
    fn all_conflicts_with_page() {
        let result = TestCli::try_parse_from(["apimart", "apis", "mine", "--all", "--page", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn prefs_set_changes_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferencesStore::in_dir(dir.path());

        PrefsCommands::Set {
            language: Some(Language::Zh),
            theme: None,
        }
        .execute(&store)
        .unwrap();

        let preferences = store.load().unwrap();
        assert_eq!(preferences.language, Language::Zh);
        assert_eq!(preferences.theme, Theme::System);
    }
}
