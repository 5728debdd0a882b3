use std::error::Error;
use std::sync::Arc;

use bookswap::account;
use bookswap::catalog::{self, BrowseQuery, SortOrder};
use bookswap::common::{ConversationKey, Listing, NewListing, Profile, ProfileUpdate, TranscriptEntry};
use bookswap::config::{self, AppConfig};
use bookswap::{ChatSession, DataService, LocalBackend, MarketError, SessionUpdate, TranscriptSynchronizer};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

#[derive(Parser)]
#[command(name = "bookswap", version, about = "Book resale marketplace client")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a user profile
    Register {
        username: String,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Act as an existing user from now on
    Login { username: String },
    Logout,
    Whoami,
    /// Show or edit the current user's profile; an empty phone or bio clears it
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },
    /// List a book for sale
    Sell {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        category: String,
        #[arg(long)]
        condition: String,
        #[arg(long)]
        contact: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image: Option<String>,
    },
    /// Search and sort listings
    Browse {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "all")]
        category: String,
        #[arg(long, default_value_t = 0.0)]
        min_price: f64,
        #[arg(long, default_value_t = catalog::DEFAULT_MAX_PRICE)]
        max_price: f64,
        /// newest, oldest, price-low, price-high or title
        #[arg(long, default_value = "newest")]
        sort: SortOrder,
    },
    /// The most recently listed books
    Recent,
    /// Details of one listing and a few others worth a look
    Show { listing: String },
    /// Listings of the current user
    Mine,
    /// Print the conversation of a listing
    History { listing: String },
    /// Send one message about a listing
    Send { listing: String, text: String },
    /// Open a live conversation; lines typed on stdin are sent
    Chat { listing: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config).with_env_overrides();

    if let Err(err) = run(cli, app_config).await {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli, app_config: AppConfig) -> Result<(), Box<dyn Error>> {
    let backend = Arc::new(
        LocalBackend::open(&app_config.database_path)?
            .with_current_user(app_config.current_user.clone())
            .with_poll_interval(app_config.poll_interval()),
    );

    match cli.command {
        Command::Register { username, avatar } => {
            let profile = backend.insert_profile(&username, avatar).await?;
            println!("Registered {} ({})", profile.display_name, profile.id);
        }
        Command::Login { username } => {
            let profile = backend
                .find_profile_by_name(&username)
                .await?
                .ok_or_else(|| MarketError::NotFound(format!("user {username}")))?;
            config::persist_current_user(&cli.config, Some(&profile.id))?;
            println!("Logged in as {}", profile.display_name);
        }
        Command::Logout => {
            config::persist_current_user(&cli.config, None)?;
            println!("Logged out");
        }
        Command::Whoami => {
            let user = backend.current_user().ok_or(MarketError::NotAuthenticated)?;
            match backend.fetch_profile(&user).await? {
                Some(profile) => println!("{} ({})", profile.display_name, profile.id),
                None => println!("{user} (no profile)"),
            }
        }
        Command::Profile { name, phone, bio } => {
            let update = ProfileUpdate {
                display_name: name,
                phone,
                bio,
            };
            let profile = account::update_profile(backend.as_ref(), update).await?;
            print_profile(&profile);
        }
        Command::Sell {
            title,
            author,
            price,
            category,
            condition,
            contact,
            description,
            image,
        } => {
            let listing = catalog::publish_listing(
                backend.as_ref(),
                NewListing {
                    title,
                    author,
                    price,
                    category,
                    condition,
                    description,
                    contact_number: contact,
                    image_url: image,
                },
            )
            .await?;
            println!("Listed {} as {}", listing.title, listing.id);
        }
        Command::Browse {
            search,
            category,
            min_price,
            max_price,
            sort,
        } => {
            let query = BrowseQuery {
                search,
                category: Some(category),
                min_price,
                max_price,
                sort,
            };
            let found = catalog::browse_listings(backend.as_ref(), &query).await?;
            println!("{} books found", found.len());
            for listing in &found {
                print_listing(listing);
            }
        }
        Command::Recent => {
            let recent = catalog::recent_listings(backend.as_ref(), catalog::RECENT_LIMIT).await?;
            if recent.is_empty() {
                println!("No books listed yet");
            }
            for listing in &recent {
                print_listing(listing);
            }
        }
        Command::Show { listing } => {
            let details = catalog::listing_details(backend.as_ref(), &listing).await?;
            print_listing(&details);
            if let Some(description) = &details.description {
                println!("  {description}");
            }
            println!("  contact: {}", details.contact_number);
            if let Some(image) = &details.image_url {
                println!("  image: {image}");
            }

            let related =
                catalog::related_listings(backend.as_ref(), &details.id, catalog::RELATED_LIMIT)
                    .await?;
            if !related.is_empty() {
                println!("You may also like:");
                for listing in &related {
                    print_listing(listing);
                }
            }
        }
        Command::Mine => {
            let (listings, stats) = catalog::my_listings(backend.as_ref()).await?;
            println!(
                "{} listed, {:.2} total asking",
                stats.listed, stats.total_asking
            );
            for listing in &listings {
                print_listing(listing);
            }
        }
        Command::History { listing } => {
            let sync = TranscriptSynchronizer::new(Arc::clone(&backend));
            let entries = sync.load_history(&ConversationKey::new(listing)).await?;
            if entries.is_empty() {
                println!("No messages yet");
            }
            for entry in &entries {
                println!("{}", format_entry(entry));
            }
        }
        Command::Send { listing, text } => {
            let sender = backend.current_user().ok_or(MarketError::NotAuthenticated)?;
            let sync = TranscriptSynchronizer::new(Arc::clone(&backend));
            let message = sync
                .append_outgoing(&ConversationKey::new(listing), &sender, &text)
                .await?;
            println!("Sent to {}", message.receiver_id);
        }
        Command::Chat { listing } => {
            let sync = Arc::new(TranscriptSynchronizer::new(Arc::clone(&backend)));
            let session = ChatSession::open(sync, ConversationKey::new(listing)).await?;
            run_chat(session).await?;
        }
    }

    Ok(())
}

async fn run_chat<B: DataService>(mut session: ChatSession<B>) -> Result<(), Box<dyn Error>> {
    println!(
        "Chat about \"{}\" by {} (Ctrl-C to leave)",
        session.listing().title,
        session.listing().author
    );
    if session.transcript().is_empty() {
        println!("Start the conversation about this book");
    }
    for entry in session.transcript().entries() {
        println!("{}", format_entry(entry));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            update = session.next_update() => {
                match update {
                    Some(SessionUpdate::Appended(entry)) => println!("{}", format_entry(&entry)),
                    Some(SessionUpdate::Duplicate) => {}
                    Some(SessionUpdate::Fault(notice)) => eprintln!("! {}", notice.message),
                    None => break,
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(text) if text.trim().is_empty() => {}
                    Some(text) => {
                        if let Err(err) = session.send(&text).await {
                            eprintln!("! failed to send: {err}");
                        }
                    }
                    None => break,
                }
            }
            _ = signal::ctrl_c() => {
                log::info!("Leaving chat");
                break;
            }
        }
    }

    session.close();
    Ok(())
}

fn print_listing(listing: &Listing) {
    println!(
        "  {}  {} by {}  [{} / {}]  {:.2}",
        listing.id, listing.title, listing.author, listing.category, listing.condition, listing.price
    );
}

fn print_profile(profile: &Profile) {
    println!("{} ({})", profile.display_name, profile.id);
    if let Some(phone) = &profile.phone {
        println!("  phone: {phone}");
    }
    if let Some(bio) = &profile.bio {
        println!("  bio: {bio}");
    }
}

fn format_entry(entry: &TranscriptEntry) -> String {
    let time = DateTime::from_timestamp_millis(entry.created_at())
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    format!(
        "[{time}] {}: {}",
        entry.sender.display_name(),
        entry.message.content
    )
}
