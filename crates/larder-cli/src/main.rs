mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use larder_core::donation::{list_requests, offer_donation};
use larder_core::{
    Campaigns, Clock, Config, DonationWorkflow, Error, FixedClock, FoodItemPatch, HttpExtractor,
    Inventory, InventorySummary, InventoryWatcher, NewCampaign, NewFoodItem, NgoId, NgoRegistry,
    OwnerId, SqliteStore, SystemClock, WatcherEvent,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::output::ConsoleSink;

#[derive(Parser)]
#[command(name = "larder")]
#[command(version, about = "Track perishable food and get it to NGOs before it spoils", long_about = None)]
struct Cli {
    /// SQLite database file (overrides the config file)
    #[arg(long, global = true, env = "LARDER_DB")]
    db: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Classify as if today were this date (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage food items
    Items {
        #[command(subcommand)]
        command: ItemCommands,
    },
    /// Show inventory counts by freshness
    Summary {
        #[arg(long)]
        owner: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Follow an inventory live and print expiry alerts
    Watch {
        #[arg(long)]
        owner: String,
    },
    /// Work with an NGO's donation requests
    Donations {
        #[command(subcommand)]
        command: DonationCommands,
    },
    /// Manage the NGO registry
    Ngos {
        #[command(subcommand)]
        command: NgoCommands,
    },
    /// Crowdfunding campaigns
    Campaigns {
        #[command(subcommand)]
        command: CampaignCommands,
    },
}

#[derive(clap::Subcommand)]
enum ItemCommands {
    /// List items with their freshness
    List {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        json: bool,
    },
    /// Add an item
    Add {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        quantity: u32,
        /// Expiry date (YYYY-MM-DD)
        #[arg(long)]
        expires: Option<NaiveDate>,
    },
    /// Change an item's name, quantity or expiry date
    Update {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        quantity: Option<u32>,
        #[arg(long, conflicts_with = "clear_expiry")]
        expires: Option<NaiveDate>,
        /// Remove the expiry date
        #[arg(long)]
        clear_expiry: bool,
    },
    /// Remove an item
    Delete {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        id: String,
    },
    /// Add an item, reading its expiry date from a photo
    Scan {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        quantity: u32,
        /// Photo of the packaging
        image: PathBuf,
    },
}

#[derive(clap::Subcommand)]
enum DonationCommands {
    /// List an NGO's donation requests
    List {
        #[arg(long)]
        ngo: String,
        #[arg(long)]
        json: bool,
    },
    /// Offer an item to an NGO
    Offer {
        #[arg(long)]
        ngo: String,
        #[arg(long)]
        donor: String,
        #[arg(long)]
        item: String,
    },
    /// Accept a pending request
    Accept {
        #[arg(long)]
        ngo: String,
        #[arg(long)]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum NgoCommands {
    /// List registered NGOs
    List {
        #[arg(long)]
        json: bool,
    },
    /// Register an NGO
    Add {
        /// NGO name
        name: String,
    },
    /// Remove an NGO from the registry
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum CampaignCommands {
    /// List campaigns and their progress
    List {
        #[arg(long)]
        json: bool,
    },
    /// Start a campaign
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Funding goal
        #[arg(long)]
        goal: f64,
        /// Shown as the campaign's creator (defaults to Anonymous)
        #[arg(long)]
        creator: Option<String>,
    },
    /// Back a campaign
    Donate {
        #[arg(long)]
        id: String,
        #[arg(long)]
        amount: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db) = &cli.db {
        config.store.path = db.clone();
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let clock: Arc<dyn Clock> = match cli.today {
        Some(today) => Arc::new(FixedClock::on_date(today)),
        None => Arc::new(SystemClock),
    };

    let store = Arc::new(open_store(&config.store.path)?);

    match cli.command {
        Commands::Items { command } => run_items(command, store, clock, &config).await,
        Commands::Summary { owner, json } => {
            let items = Inventory::new(store)
                .list_items(&OwnerId(owner), clock.now())
                .await?;
            let summary = InventorySummary::from_items(&items);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", output::format_summary(&summary));
            }
            Ok(())
        }
        Commands::Watch { owner } => watch(OwnerId(owner), store, clock, &config).await,
        Commands::Donations { command } => run_donations(command, store).await,
        Commands::Ngos { command } => run_ngos(command, store).await,
        Commands::Campaigns { command } => run_campaigns(command, store).await,
    }
}

fn open_store(path: &Path) -> anyhow::Result<SqliteStore> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }

    let path = path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", path.display()))?;
    tracing::debug!("Using database {}", path);
    Ok(SqliteStore::open(path)?)
}

async fn run_items(
    command: ItemCommands,
    store: Arc<SqliteStore>,
    clock: Arc<dyn Clock>,
    config: &Config,
) -> anyhow::Result<()> {
    let inventory = Inventory::new(store);

    match command {
        ItemCommands::List { owner, json } => {
            let items = inventory.list_items(&OwnerId(owner), clock.now()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                print!("{}", output::format_items(&items));
            }
        }
        ItemCommands::Add {
            owner,
            name,
            quantity,
            expires,
        } => {
            let id = inventory
                .add_item(&OwnerId(owner), NewFoodItem::new(name, quantity, expires))
                .await?;
            println!("Food item added successfully! ({})", id);
        }
        ItemCommands::Update {
            owner,
            id,
            name,
            quantity,
            expires,
            clear_expiry,
        } => {
            let expiry_date = if clear_expiry { Some(None) } else { expires.map(Some) };
            let patch = FoodItemPatch {
                name,
                quantity,
                expiry_date,
            };
            inventory.update_item(&OwnerId(owner), &id, patch).await?;
            println!("Item {} updated.", id);
        }
        ItemCommands::Delete { owner, id } => {
            inventory.delete_item(&OwnerId(owner), &id).await?;
            println!("Item deleted successfully!");
        }
        ItemCommands::Scan {
            owner,
            name,
            quantity,
            image,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("Could not read {}", image.display()))?;
            let file_name = image
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload.jpg")
                .to_string();

            let extractor = HttpExtractor::new(&config.extraction);
            let (id, expiry) = inventory
                .add_from_image(&OwnerId(owner), &name, quantity, &bytes, &file_name, &extractor)
                .await?;

            match expiry {
                Some(date) => println!("Added {} ({}), expires {}", name, id, date),
                None => println!("Added {} ({}), no expiry date found on the photo", name, id),
            }
        }
    }

    Ok(())
}

async fn run_donations(command: DonationCommands, store: Arc<SqliteStore>) -> anyhow::Result<()> {
    match command {
        DonationCommands::List { ngo, json } => {
            let requests = list_requests(store.as_ref(), &NgoId(ngo)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&requests)?);
            } else {
                print!("{}", output::format_requests(&requests));
            }
        }
        DonationCommands::Offer { ngo, donor, item } => {
            let id = offer_donation(store.as_ref(), &NgoId(ngo), &item, &donor).await?;
            println!("Donation offered ({})", id);
        }
        DonationCommands::Accept { ngo, id } => {
            let workflow = DonationWorkflow::new(store);
            match workflow.accept(&NgoId(ngo), &id).await {
                Ok(()) => println!("Donation accepted!"),
                Err(Error::AlreadyAccepted { .. }) => {
                    println!("Donation {} was already accepted, nothing to do.", id)
                }
                Err(e) => return Err(e).context("Failed to accept donation"),
            }
        }
    }

    Ok(())
}

async fn run_ngos(command: NgoCommands, store: Arc<SqliteStore>) -> anyhow::Result<()> {
    let registry = NgoRegistry::new(store);

    match command {
        NgoCommands::List { json } => {
            let ngos = registry.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ngos)?);
            } else {
                print!("{}", output::format_ngos(&ngos));
            }
        }
        NgoCommands::Add { name } => {
            let id = registry.register(&name).await?;
            println!("NGO registered ({})", id);
        }
        NgoCommands::Remove { id } => {
            registry.remove(&NgoId(id)).await?;
            println!("NGO removed.");
        }
    }

    Ok(())
}

async fn run_campaigns(command: CampaignCommands, store: Arc<SqliteStore>) -> anyhow::Result<()> {
    let campaigns = Campaigns::new(store);

    match command {
        CampaignCommands::List { json } => {
            let list = campaigns.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                print!("{}", output::format_campaigns(&list));
            }
        }
        CampaignCommands::Create {
            title,
            description,
            goal,
            creator,
        } => {
            let id = campaigns
                .create(NewCampaign {
                    title,
                    description,
                    goal,
                    creator,
                })
                .await?;
            println!("Campaign started ({})", id);
        }
        CampaignCommands::Donate { id, amount } => {
            let campaign = campaigns.donate(&id, amount).await?;
            println!(
                "Thank you! {} has raised {:.2} of {:.2} ({} backers)",
                campaign.title, campaign.raised, campaign.goal, campaign.backers
            );
        }
    }

    Ok(())
}

async fn watch(
    owner: OwnerId,
    store: Arc<SqliteStore>,
    clock: Arc<dyn Clock>,
    config: &Config,
) -> anyhow::Result<()> {
    let watcher = InventoryWatcher::new(store.clone(), clock, Arc::new(ConsoleSink));
    let mut handle = watcher.start(owner.clone()).await?;
    println!("Watching {}'s inventory. Press Ctrl-C to stop.", owner);

    let mut poll = tokio::time::interval(Duration::from_millis(config.store.poll_interval_ms.max(50)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                handle.stop();
                println!("Stopped.");
                break;
            }
            _ = poll.tick() => {
                // Picks up writes from other `larder` processes
                if let Err(e) = store.poll_changes() {
                    tracing::warn!("Polling for changes failed: {}", e);
                }
            }
            event = handle.next_event() => match event {
                Some(WatcherEvent::Updated { items, .. }) => {
                    print!("{}", output::format_items(&items));
                }
                Some(WatcherEvent::ConnectionLost { reason }) => {
                    handle.stop();
                    anyhow::bail!("Lost connection to the store: {}", reason);
                }
                None => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}
