//! CLI entry point for the asset graph.
//!
//! Reads JSON resources from stdin where a command takes one, writes JSON
//! results to stdout. Logs go to stderr.

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use assetgraph_core::types::Direction;
use assetgraph_graph::{DevicesDao, GetOptions, GraphClient, GroupsDao, Page, RelatedQuery};
use assetgraph_search::{SearchDao, SearchRequest};
use assetgraph_service::config::{AppConfig, LogFormat, DEFAULT_CONFIG_PREFIX};
use assetgraph_service::{DeviceItem, DevicesService, GroupItem, GroupsService, SearchService};

#[derive(Parser)]
#[command(name = "assetgraph")]
#[command(about = "Query and mutate the device/group asset graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PREFIX, global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Device operations.
    #[command(subcommand)]
    Device(DeviceCommand),
    /// Group operations.
    #[command(subcommand)]
    Group(GroupCommand),
    /// Search operations.
    #[command(subcommand)]
    Search(SearchCommand),
}

#[derive(Subcommand)]
enum DeviceCommand {
    /// Fetch a device.
    Get {
        device_id: String,
        /// Include components.
        #[arg(long)]
        components: bool,
        /// Include related groups and devices.
        #[arg(long)]
        groups: bool,
        /// Only return these attributes (comma separated).
        #[arg(long, value_delimiter = ',')]
        attributes: Option<Vec<String>>,
    },
    /// Create a device (reads a device JSON from stdin).
    Create,
    /// Delete a device and its components.
    Delete { device_id: String },
    /// List entities related to a device.
    Related {
        device_id: String,
        #[command(flatten)]
        related: RelatedArgs,
    },
}

#[derive(Subcommand)]
enum GroupCommand {
    /// Fetch a group.
    Get { group_path: String },
    /// Create a group (reads a group JSON from stdin).
    Create,
    /// List a group and its ancestors, nearest first.
    Parents { group_path: String },
}

#[derive(Subcommand)]
enum SearchCommand {
    /// Print both wire forms of a search query string.
    Encode {
        /// Query string, e.g. `type=vehicle&eq=state%3Aactive`.
        query: String,
    },
    /// Run a search given as a query string.
    Run {
        query: String,
        #[arg(long)]
        offset: Option<u32>,
        #[arg(long)]
        count: Option<u32>,
    },
}

#[derive(Args)]
struct RelatedArgs {
    /// Relationship label, `*` for any.
    #[arg(long, default_value = "*")]
    relationship: String,
    /// in, out, or both.
    #[arg(long, default_value = "both")]
    direction: String,
    /// Only related entities of this template.
    #[arg(long)]
    template: Option<String>,
    /// List related groups instead of devices.
    #[arg(long)]
    groups: bool,
    #[arg(long)]
    offset: Option<u32>,
    #[arg(long)]
    count: Option<u32>,
}

impl RelatedArgs {
    fn query(&self) -> anyhow::Result<RelatedQuery> {
        let direction: Direction = self.direction.parse()?;
        let mut query = RelatedQuery::new(self.relationship.as_str(), direction);
        query.template = self.template.clone();
        query.page = page(self.offset, self.count);
        Ok(query)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match app_config.log_format {
        LogFormat::Json => fmt().with_env_filter(filter).json().with_writer(std::io::stderr).init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_writer(std::io::stderr).init(),
    }

    // Encoding needs no graph.
    if let Command::Search(SearchCommand::Encode { query }) = &cli.command {
        return encode(query);
    }

    let graph = GraphClient::connect(&app_config.neo4j).await?;
    let legacy = app_config.neo4j.legacy_label_fallback;

    match cli.command {
        Command::Device(cmd) => {
            let service = DevicesService::new(DevicesDao::new(graph).with_legacy_label_fallback(legacy));
            run_device(&service, cmd).await?;
        }
        Command::Group(cmd) => {
            let service = GroupsService::new(GroupsDao::new(graph).with_legacy_label_fallback(legacy));
            run_group(&service, cmd).await?;
        }
        Command::Search(SearchCommand::Run { query, offset, count }) => {
            let service = SearchService::new(SearchDao::new(graph));
            let results = service.search_query_string(&query, page(offset, count)).await?;
            println!("{}", serde_json::to_string(&results)?);
        }
        Command::Search(SearchCommand::Encode { query }) => encode(&query)?,
    }

    Ok(())
}

fn encode(query: &str) -> anyhow::Result<()> {
    let request = SearchRequest::from_query_string(query)?;
    let out = serde_json::json!({
        "queryString": request.to_query_string(),
        "multiValue": request.to_multi_value_map(),
    });
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

async fn run_device(service: &DevicesService<GraphClient>, cmd: DeviceCommand) -> anyhow::Result<()> {
    match cmd {
        DeviceCommand::Get {
            device_id,
            components,
            groups,
            attributes,
        } => {
            let options = GetOptions {
                expand_components: components,
                include_groups: groups,
                attributes,
            };
            let item = service
                .get(&device_id, &options)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Device {device_id} not found"))?;
            println!("{}", serde_json::to_string(&item)?);
        }
        DeviceCommand::Create => {
            let input = std::io::read_to_string(std::io::stdin())?;
            let item: DeviceItem = serde_json::from_str(&input)?;
            let id = service.create(&item).await?;
            println!("{}", serde_json::json!({ "deviceId": id }));
        }
        DeviceCommand::Delete { device_id } => {
            service.delete(&device_id).await?;
        }
        DeviceCommand::Related { device_id, related } => {
            let query = related.query()?;
            let out = if related.groups {
                service
                    .list_related_groups(&device_id, &query)
                    .await?
                    .map(serde_json::to_value)
                    .transpose()?
            } else {
                service
                    .list_related_devices(&device_id, &query)
                    .await?
                    .map(serde_json::to_value)
                    .transpose()?
            };
            let out = out.ok_or_else(|| anyhow::anyhow!("Device {device_id} not found"))?;
            println!("{}", serde_json::to_string(&out)?);
        }
    }
    Ok(())
}

async fn run_group(service: &GroupsService<GraphClient>, cmd: GroupCommand) -> anyhow::Result<()> {
    match cmd {
        GroupCommand::Get { group_path } => {
            let item = service
                .get(&group_path)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Group {group_path} not found"))?;
            println!("{}", serde_json::to_string(&item)?);
        }
        GroupCommand::Create => {
            let input = std::io::read_to_string(std::io::stdin())?;
            let item: GroupItem = serde_json::from_str(&input)?;
            let path = service.create(&item).await?;
            println!("{}", serde_json::json!({ "groupPath": path }));
        }
        GroupCommand::Parents { group_path } => {
            let chain = service.list_parent_groups(&group_path).await?;
            println!("{}", serde_json::to_string(&chain)?);
        }
    }
    Ok(())
}

fn page(offset: Option<u32>, count: Option<u32>) -> Option<Page> {
    match (offset, count) {
        (None, None) => None,
        (offset, count) => Some(Page::new(offset.unwrap_or(0), count.unwrap_or(u32::MAX))),
    }
}
