use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use club_client::beers::BeerEditor;
use club_client::crop::CropPurpose;
use club_client::pipeline::{CropOutcome, CropSession, CropTarget};
use club_client::{ClubClient, ClubError, Environment, Feedback};
use club_storage::beer::{Beer, BeerSort, SUGGESTED_COLORS};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

/// Beer club client
#[derive(Parser)]
#[command(name = "club", version, about = "Keep the beer club's tasting list", long_about = None)]
struct Cli {
    /// Print the outcome as JSON
    #[arg(global = true, long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Email a sign-in code
    Login { email: String },

    /// Sign in with the emailed code
    Verify { email: String, code: String },

    /// Sign out
    Logout,

    /// Show the signed-in member
    Whoami,

    /// List beers
    List {
        /// Only beers whose name, brewery, style or color contain this
        #[arg(long)]
        search: Option<String>,

        /// newest, oldest, name or rating
        #[arg(long, default_value_t = BeerSort::Newest)]
        sort: BeerSort,
    },

    /// Add a beer
    Add {
        #[arg(long)]
        name: String,

        #[command(flatten)]
        details: BeerDetails,

        #[command(flatten)]
        photo: PhotoArgs,
    },

    /// Edit a beer
    Edit {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        details: BeerDetails,

        #[command(flatten)]
        photo: PhotoArgs,
    },

    /// Delete a beer and its photo
    Delete { id: String },

    /// Replace the club cover
    Cover {
        path: PathBuf,

        #[command(flatten)]
        crop: CropArgs,
    },
}

#[derive(Args)]
struct BeerDetails {
    #[arg(long)]
    brewery: Option<String>,

    #[arg(long)]
    style: Option<String>,

    #[arg(long, help = format!("Color, e.g. {}", SUGGESTED_COLORS.join(", ")))]
    color: Option<String>,

    #[arg(long)]
    price: Option<String>,

    /// 0 (unrated) to 5
    #[arg(long)]
    rating: Option<u8>,
}

#[derive(Args)]
struct PhotoArgs {
    /// Image file to crop into the beer photo
    #[arg(long)]
    photo: Option<PathBuf>,

    #[command(flatten)]
    crop: CropArgs,
}

#[derive(Args, Clone, Copy)]
struct CropArgs {
    /// Zoom between 1 and 3
    #[arg(long, default_value_t = 1.0)]
    zoom: f64,

    /// Move the frame from the center by dx,dy source pixels
    #[arg(long, value_parser = parse_pan, allow_hyphen_values = true, default_value = "0,0")]
    pan: (f64, f64),
}

fn parse_pan(value: &str) -> Result<(f64, f64), String> {
    let (dx, dy) = value
        .split_once(',')
        .ok_or_else(|| format!("expected dx,dy but got {value:?}"))?;
    let dx = dx.trim().parse().map_err(|e| format!("invalid dx: {e}"))?;
    let dy = dy.trim().parse().map_err(|e| format!("invalid dy: {e}"))?;
    Ok((dx, dy))
}

impl BeerDetails {
    fn apply(self, editor: &mut BeerEditor) {
        if let Some(brewery) = self.brewery {
            editor.brewery = brewery;
        }
        if let Some(style) = self.style {
            editor.style = style;
        }
        if let Some(color) = self.color {
            editor.color = color;
        }
        if let Some(price) = self.price {
            editor.price = price;
        }
        if let Some(rating) = self.rating {
            editor.rating = rating;
        }
    }
}

/// Opens `path`, frames it at the requested zoom and pan
async fn open_crop(path: &Path, purpose: CropPurpose, args: CropArgs) -> anyhow::Result<CropSession> {
    let bytes = tokio::fs::read(path).await?;
    let mut crop = CropSession::open(&bytes, purpose)?;

    let frame = crop.frame_mut();
    frame.set_zoom(args.zoom);
    frame.drag(args.pan.0, args.pan.1);

    Ok(crop)
}

async fn attach_photo(
    client: &ClubClient,
    photo: PhotoArgs,
    editor: &mut BeerEditor,
    editing: bool,
) -> anyhow::Result<()> {
    let Some(path) = photo.photo else {
        return Ok(());
    };

    let crop = open_crop(&path, CropPurpose::BeerPhoto, photo.crop).await?;
    let target = if editing {
        CropTarget::EditBeer(editor)
    } else {
        CropTarget::NewBeer(editor)
    };
    client.confirm_crop(crop, target).await?;
    Ok(())
}

fn describe(beer: &Beer) -> String {
    let mut line = format!("{}  {}", beer.id, beer.name);
    for detail in [&beer.brewery, &beer.style, &beer.color] {
        if !detail.is_empty() {
            let _ = write!(line, " | {detail}");
        }
    }
    if !beer.price.is_empty() {
        let _ = write!(line, " | {} kr", beer.price);
    }
    if beer.rating > 0 {
        let _ = write!(line, " | {}", "*".repeat(usize::from(beer.rating)));
    }
    line
}

async fn run(client: &ClubClient, command: Command) -> anyhow::Result<Feedback> {
    let feedback = match command {
        Command::Login { email } => {
            client.request_code(&email).await?;
            Feedback::success(format!("Sent a sign-in code to {}", email.trim()))
        }
        Command::Verify { email, code } => {
            let session = client.verify_code(&email, &code).await?;
            Feedback::success(format!(
                "Signed in as {}",
                session.user.email.unwrap_or(session.user.id)
            ))
        }
        Command::Logout => {
            client.sign_out().await?;
            Feedback::success("Signed out")
        }
        Command::Whoami => match client.current_session().await? {
            Some(session) => Feedback::success(format!(
                "Signed in as {} ({})",
                session.user.email.unwrap_or_default(),
                session.user.id
            )),
            None => Feedback::from(&ClubError::NotSignedIn),
        },
        Command::List { search, sort } => {
            let listing = client.list_beers(search.as_deref(), sort).await?;
            for beer in &listing.beers {
                println!("{}", describe(beer));
            }

            if listing.load_failed {
                Feedback {
                    ok: false,
                    allow_retry: true,
                    code: Some("load_failed"),
                    message: "Could not load beers".to_string(),
                }
            } else {
                Feedback::success(format!("{} beers", listing.beers.len()))
            }
        }
        Command::Add {
            name,
            details,
            photo,
        } => {
            let mut editor = BeerEditor::new();
            editor.name = name;
            details.apply(&mut editor);
            attach_photo(client, photo, &mut editor, false).await?;

            let beer = client.create_beer(&mut editor).await?;
            Feedback::success(format!("Added {} ({})", beer.name, beer.id))
        }
        Command::Edit {
            id,
            name,
            details,
            photo,
        } => {
            let beer = client.get_beer(&id).await?;
            let mut editor = BeerEditor::for_beer(&beer);
            if let Some(name) = name {
                editor.name = name;
            }
            details.apply(&mut editor);
            attach_photo(client, photo, &mut editor, true).await?;

            let beer = client.update_beer(&mut editor).await?;
            Feedback::success(format!("Updated {}", beer.name))
        }
        Command::Delete { id } => {
            let beer = client.get_beer(&id).await?;
            client.delete_beer(&beer).await?;
            Feedback::success(format!("Deleted {}", beer.name))
        }
        Command::Cover { path, crop } => {
            let crop = open_crop(&path, CropPurpose::ClubCover, crop).await?;
            match client.confirm_crop(crop, CropTarget::ClubCover).await? {
                CropOutcome::CoverReplaced(Some(url)) => Feedback::success(url.url),
                CropOutcome::CoverReplaced(None) => {
                    Feedback::success("Cover replaced, but no link to it could be made yet")
                }
                CropOutcome::Cancelled | CropOutcome::PhotoPending => {
                    Feedback::success("Cover unchanged")
                }
            }
        }
    };

    Ok(feedback)
}

fn report(feedback: &Feedback, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(feedback)?);
    } else if feedback.ok {
        println!("{}", feedback.message);
    } else {
        eprintln!("{}", feedback.message);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let environment = Environment::from_env();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(environment.tracing_level()).into())
        .from_env_lossy();

    // JSON logs for staging/production, readable logs for development.
    // Logs go to stderr so stdout only carries results.
    match environment {
        Environment::Production | Environment::Staging => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        Environment::Development { .. } => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let client = ClubClient::from_environment(&environment).await?;

    match run(&client, cli.command).await {
        Ok(feedback) => report(&feedback, cli.json),
        Err(err) => {
            let feedback = match err.downcast_ref::<ClubError>() {
                Some(club_err) => {
                    club_err.log();
                    Feedback::from(club_err)
                }
                None => Feedback {
                    ok: false,
                    allow_retry: false,
                    code: Some("cli_error"),
                    message: err.to_string(),
                },
            };
            report(&feedback, cli.json)?;
            std::process::exit(1);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn beer(brewery: &str, price: &str, rating: u8) -> Beer {
        Beer {
            id: "b1".to_string(),
            club_id: "club".to_string(),
            user_id: "member".to_string(),
            name: "Pale".to_string(),
            brewery: brewery.to_string(),
            style: String::new(),
            color: "Amber".to_string(),
            price: price.to_string(),
            rating,
            photo_path: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_describe_lists_filled_in_details() {
        assert_eq!(
            describe(&beer("Lervig", "89", 3)),
            "b1  Pale | Lervig | Amber | 89 kr | ***"
        );
    }

    #[test]
    fn test_describe_skips_empty_details() {
        assert_eq!(describe(&beer("", "", 0)), "b1  Pale | Amber");
    }
}
