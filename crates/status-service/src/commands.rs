//! Command-line surface of the order status service.
//!
//! Every engine operation is a subcommand. Results are returned as JSON
//! values for `main` to print; errors keep the engine's error kind.

use clap::{Args, Subcommand};
use serde_json::{json, Value};
use status_core::{EngineError, StatusEngine};
use status_types::{Actor, Credential, RecordFilter, ShippingInfo, StatusRef};
use thiserror::Error;

/// Errors surfaced by a command.
#[derive(Debug, Error)]
pub enum CommandError {
	#[error(transparent)]
	Engine(#[from] EngineError),
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Seed the default statuses into an empty catalog
	Seed,
	/// Create the status record of an order (idempotent per order)
	Init {
		#[arg(long)]
		order_id: String,
		#[arg(long)]
		user_id: String,
		/// Initial status, by catalog id or name
		#[arg(long)]
		status: Option<String>,
		/// Shipping snapshot as JSON, e.g. '{"city":"Rosario"}'
		#[arg(long)]
		shipping: Option<String>,
	},
	/// Change the status of a record on behalf of the token's owner
	Change {
		#[command(flatten)]
		auth: TokenArg,
		#[command(flatten)]
		record: RecordSelector,
		/// Target status, by catalog id or name
		#[arg(long)]
		status: String,
		#[arg(long)]
		reason: Option<String>,
	},
	/// Show one record
	Get {
		#[command(flatten)]
		record: RecordSelector,
	},
	/// List records, optionally filtered
	List {
		#[arg(long)]
		user: Option<String>,
		#[arg(long)]
		status: Option<String>,
		#[arg(long)]
		status_id: Option<String>,
	},
	/// Distinct statuses currently held by records
	Statuses,
	/// Status catalog operations
	#[command(subcommand)]
	Catalog(CatalogCommand),
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
	/// List the catalog in order
	List,
	/// Add a status (administrators only)
	Add {
		#[command(flatten)]
		auth: TokenArg,
		name: String,
	},
	/// Whether a status is terminal
	Terminal {
		/// Status, by catalog id or name
		status: String,
	},
}

/// Bearer credential of the acting user.
#[derive(Args, Debug)]
pub struct TokenArg {
	/// Bearer token, with or without the "Bearer " prefix
	#[arg(long, env = "ORDER_STATUS_TOKEN", hide_env_values = true)]
	token: String,
}

/// Selects a record by its id or by its order.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct RecordSelector {
	#[arg(long)]
	record_id: Option<String>,
	#[arg(long)]
	order_id: Option<String>,
}

impl Command {
	/// Runs the command against the engine.
	pub async fn execute(self, engine: &StatusEngine) -> Result<Value, CommandError> {
		match self {
			Command::Seed => {
				let inserted = engine.seed_catalog().await?;
				Ok(json!({ "inserted": inserted }))
			},
			Command::Init {
				order_id,
				user_id,
				status,
				shipping,
			} => {
				let shipping = match shipping {
					Some(raw) => serde_json::from_str::<ShippingInfo>(&raw)
						.map_err(|e| CommandError::InvalidInput(format!("shipping: {}", e)))?,
					None => ShippingInfo::default(),
				};
				let status = status.as_deref().map(StatusRef::from_input);
				let record = engine
					.initialize(&order_id, &user_id, shipping, status)
					.await?;
				Ok(serde_json::to_value(record)?)
			},
			Command::Change {
				auth,
				record,
				status,
				reason,
			} => {
				let actor = authenticate(engine, &auth).await?;
				let target = StatusRef::from_input(&status);
				let updated = match (record.record_id, record.order_id) {
					(Some(id), _) => engine.change_status(&id, &target, &actor, reason).await?,
					(None, Some(order_id)) => {
						engine
							.change_status_by_order(&order_id, &target, &actor, reason)
							.await?
					},
					(None, None) => return Err(missing_selector()),
				};
				Ok(serde_json::to_value(updated)?)
			},
			Command::Get { record } => {
				let found = match (record.record_id, record.order_id) {
					(Some(id), _) => engine.get_record(&id).await?,
					(None, Some(order_id)) => engine.get_by_order(&order_id).await?,
					(None, None) => return Err(missing_selector()),
				};
				Ok(serde_json::to_value(found)?)
			},
			Command::List {
				user,
				status,
				status_id,
			} => {
				let filter = RecordFilter {
					user_id: user,
					status,
					status_id,
				};
				Ok(serde_json::to_value(engine.list(&filter).await?)?)
			},
			Command::Statuses => Ok(serde_json::to_value(engine.statuses_in_use().await?)?),
			Command::Catalog(CatalogCommand::List) => {
				Ok(serde_json::to_value(engine.list_statuses().await?)?)
			},
			Command::Catalog(CatalogCommand::Add { auth, name }) => {
				let actor = authenticate(engine, &auth).await?;
				Ok(serde_json::to_value(engine.add_status(&actor, &name).await?)?)
			},
			Command::Catalog(CatalogCommand::Terminal { status }) => {
				let status = StatusRef::from_input(&status);
				let terminal = engine.is_terminal_status(&status).await?;
				Ok(json!({ "status": status, "terminal": terminal }))
			},
		}
	}
}

async fn authenticate(engine: &StatusEngine, auth: &TokenArg) -> Result<Actor, CommandError> {
	let credential = Credential::from_authorization_header(&auth.token);
	Ok(engine.authenticate(&credential).await?)
}

fn missing_selector() -> CommandError {
	CommandError::InvalidInput("either --record-id or --order-id is required".into())
}
