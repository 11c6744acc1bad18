use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "roshnii")]
#[command(about = "Roshnii CLI: browse and manage your photo albums")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server URL, e.g. http://localhost:8080 (overrides config and ROSHNII_URL env var)
    #[arg(short, long, global = true, env = "ROSHNII_URL")]
    pub server: Option<String>,

    /// Config profile name
    #[arg(short, long, global = true, env = "ROSHNII_PROFILE", default_value = "default")]
    pub profile: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Client settings file (defaults to ./roshnii.toml when present)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level for client diagnostics (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a session (prints the Google sign-in URL when no flags are given)
    Login(LoginArgs),
    /// End the session on the server and forget stored credentials
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Check server health
    Status,
    /// Manage albums
    Albums(AlbumsArgs),
    /// Manage images
    Images(ImagesArgs),
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Use the development login endpoint
    #[arg(long, requires = "email")]
    pub dev: bool,
    /// Email for development login
    #[arg(long)]
    pub email: Option<String>,
    /// Display name for development login (defaults to the email's local part)
    #[arg(long)]
    pub name: Option<String>,
    /// Cookie header copied from a browser session (auth_token=...; refresh_token=...)
    #[arg(long, conflicts_with_all = ["dev", "token"])]
    pub cookie: Option<String>,
    /// Raw session token
    #[arg(long, conflicts_with = "dev")]
    pub token: Option<String>,
}

#[derive(clap::Args)]
pub struct AlbumsArgs {
    #[command(subcommand)]
    pub command: AlbumCommands,
}

#[derive(Subcommand)]
pub enum AlbumCommands {
    /// List your albums
    List,
    /// Show one album
    Show { id: String },
    /// Create an album
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Rename an album or change its description
    Update {
        id: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete an album (its images are kept)
    Delete { id: String },
    /// List the images in an album
    Images { id: String },
    /// Add an image to an album
    Add { album_id: String, image_id: String },
    /// Remove an image from an album
    Remove { album_id: String, image_id: String },
}

#[derive(clap::Args)]
pub struct ImagesArgs {
    #[command(subcommand)]
    pub command: ImageCommands,
}

#[derive(Subcommand)]
pub enum ImageCommands {
    /// List your images
    List {
        /// Case-insensitive filename filter
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show image metadata
    Show { id: String },
    /// Upload an image file
    Upload {
        path: String,
        /// MIME type (guessed from the file extension when omitted)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download an image's content
    Download {
        id: String,
        /// Destination file (defaults to the image's filename)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Delete an image
    Delete { id: String },
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
    /// Set config value
    Set(ConfigSetArgs),
}

#[derive(clap::Args)]
pub struct ConfigSetArgs {
    /// Key to set (server, format)
    pub key: String,
    /// Value
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_album_update() {
        let cli = Cli::try_parse_from([
            "roshnii", "albums", "update", "42", "--name", "Beach", "--format", "table",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Table));
        match cli.command {
            Commands::Albums(AlbumsArgs {
                command: AlbumCommands::Update { id, name, description },
            }) => {
                assert_eq!(id, "42");
                assert_eq!(name.as_deref(), Some("Beach"));
                assert!(description.is_none());
            }
            _ => panic!("expected albums update"),
        }
    }

    #[test]
    fn test_dev_login_requires_email() {
        assert!(Cli::try_parse_from(["roshnii", "login", "--dev"]).is_err());
        assert!(Cli::try_parse_from(["roshnii", "login", "--dev", "--email", "a@b.com"]).is_ok());
        assert!(
            Cli::try_parse_from(["roshnii", "login", "--cookie", "auth_token=x", "--token", "y"])
                .is_err()
        );
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("TABLE"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }
}
