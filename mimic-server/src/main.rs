use std::error::Error;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use actix_cors::Cors;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, Responder, delete, get, post, put, web};
use clap::Parser;
use serde::Deserialize;

use mimic_core::alternate::LineFileGenerator;
use mimic_core::corpus::{CancelFlag, CorpusBuilder};
use mimic_core::error::ResponderError;
use mimic_core::history::{FileHistorySource, MessageSource};
use mimic_core::ids::{AuthorId, ChannelId, CommunityId};
use mimic_core::model::generator::MessageGenerator;
use mimic_core::responder::{self, Decision, IncomingMessage};
use mimic_core::store::ModelStore;

use config::{Args, Config, HistoryConfig};
use jobs::Jobs;
use rest_source::RestHistorySource;

mod config;
mod jobs;
mod rest_source;

/// Header carrying the id of the author asking for a rebuild.
const OWNER_HEADER: &str = "X-Owner";

/// Body of `POST /v1/communities/{c}/channels/{ch}/messages`
#[derive(Deserialize)]
struct MessageEvent {
	author: AuthorId,
	content: String,
	#[serde(default)]
	automated: bool,
}

struct AppState {
	config: Config,
	generator: MessageGenerator,
	responder: Mutex<responder::Responder>,
	/// Held while a rebuild writes model files and while models are read.
	store_lock: Mutex<()>,
	jobs: Jobs,
}

impl AppState {
	fn new(config: Config) -> Self {
		let store = ModelStore::new(&config.markov_dir);
		let alternate = Arc::new(LineFileGenerator::new(&config.alternate_dir));
		let generator = MessageGenerator::new(store, alternate.clone());
		let responder = responder::Responder::new(config.responder_config(), generator.clone(), alternate);

		Self {
			config,
			generator,
			responder: Mutex::new(responder),
			store_lock: Mutex::new(()),
			jobs: Jobs::default(),
		}
	}
}

/// HTTP GET endpoint `/v1/communities/{community}/message`
///
/// Generates a message for the community (Markov or alternate generator).
/// Returns 204 when neither has anything to say.
#[get("/v1/communities/{community}/message")]
async fn get_message(data: web::Data<AppState>, path: web::Path<u64>) -> impl Responder {
	let community = CommunityId(path.into_inner());

	let _store = match data.store_lock.lock() {
		Ok(guard) => guard,
		Err(_) => return HttpResponse::InternalServerError().body("Store lock failed"),
	};
	let responder = match data.responder.lock() {
		Ok(responder) => responder,
		Err(_) => return HttpResponse::InternalServerError().body("Responder lock failed"),
	};

	match responder.generate(community, &mut rand::rng()) {
		Ok(Some(reply)) => HttpResponse::Ok().json(reply),
		Ok(None) => HttpResponse::NoContent().finish(),
		Err(e) => {
			log::error!("Generation failed for community {community}: {e}");
			HttpResponse::InternalServerError().body(e.to_string())
		}
	}
}

#[get("/v1/communities/{community}/authors")]
async fn get_authors(data: web::Data<AppState>, path: web::Path<u64>) -> impl Responder {
	let community = CommunityId(path.into_inner());

	let _store = match data.store_lock.lock() {
		Ok(guard) => guard,
		Err(_) => return HttpResponse::InternalServerError().body("Store lock failed"),
	};

	match data.generator.eligible_authors(community) {
		Ok(authors) => {
			let mut authors: Vec<AuthorId> = authors.into_iter().collect();
			authors.sort_unstable();
			HttpResponse::Ok().json(authors)
		}
		Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
	}
}

/// HTTP GET endpoint `/v1/communities/{community}/authors/{author}/mimic`
///
/// Generates a message from one author's model, 404 if they have none.
#[get("/v1/communities/{community}/authors/{author}/mimic")]
async fn get_mimic(data: web::Data<AppState>, path: web::Path<(u64, u64)>) -> impl Responder {
	let (community, author) = path.into_inner();
	let (community, author) = (CommunityId(community), AuthorId(author));

	let _store = match data.store_lock.lock() {
		Ok(guard) => guard,
		Err(_) => return HttpResponse::InternalServerError().body("Store lock failed"),
	};

	match data.generator.mimic(community, author) {
		Ok(Some(message)) => HttpResponse::Ok().body(message),
		Ok(None) => HttpResponse::NotFound().body(format!("No model found for user {author}")),
		Err(e) => {
			log::error!("Cannot mimic {author} in community {community}: {e}");
			HttpResponse::InternalServerError().body(e.to_string())
		}
	}
}

/// HTTP POST endpoint `/v1/communities/{community}/channels/{channel}/messages`
///
/// Feeds a message seen in a channel to the responder.
/// 200 with the reply to post, 204 when the bot stays quiet,
/// 403 when a non-owner tries to force a message.
#[post("/v1/communities/{community}/channels/{channel}/messages")]
async fn post_message(
	data: web::Data<AppState>,
	path: web::Path<(u64, u64)>,
	body: web::Json<MessageEvent>,
) -> impl Responder {
	let (community, channel) = path.into_inner();
	let body = body.into_inner();
	if body.automated {
		return HttpResponse::NoContent().finish();
	}

	let event = IncomingMessage {
		community: CommunityId(community),
		channel: ChannelId(channel),
		author: body.author,
		content: body.content,
	};

	let _store = match data.store_lock.lock() {
		Ok(guard) => guard,
		Err(_) => return HttpResponse::InternalServerError().body("Store lock failed"),
	};
	let mut responder = match data.responder.lock() {
		Ok(responder) => responder,
		Err(_) => return HttpResponse::InternalServerError().body("Responder lock failed"),
	};

	match responder.respond(&event, Instant::now(), &mut rand::rng()) {
		Ok(Decision::Reply(reply)) => HttpResponse::Ok().json(reply),
		Ok(Decision::Ignored) => HttpResponse::NoContent().finish(),
		Err(ResponderError::Unauthorized) => HttpResponse::Forbidden().body(ResponderError::Unauthorized.to_string()),
		Err(e) => {
			log::error!("Responder failed in channel {}: {e}", event.channel);
			HttpResponse::InternalServerError().body(e.to_string())
		}
	}
}

fn requester(req: &HttpRequest) -> Option<AuthorId> {
	req.headers().get(OWNER_HEADER)?.to_str().ok()?.parse().ok()
}

/// True when the request carries the owner's id in [`OWNER_HEADER`].
fn from_owner(data: &AppState, req: &HttpRequest) -> bool {
	requester(req).is_some_and(|author| responder::authorize_force_trigger(data.config.owner, author))
}

/// HTTP PUT endpoint `/v1/communities/{community}/rebuild`
///
/// Starts a corpus pass in the background (owner only).
#[put("/v1/communities/{community}/rebuild")]
async fn put_rebuild(data: web::Data<AppState>, path: web::Path<u64>, req: HttpRequest) -> impl Responder {
	let community = CommunityId(path.into_inner());

	if !from_owner(&data, &req) {
		return HttpResponse::Forbidden().body("Only the bot owner may rebuild models");
	}

	let Some(cancel) = data.jobs.start(community) else {
		return HttpResponse::Conflict().body("A rebuild is already running for this community");
	};

	let state = data.clone();
	let spawned = thread::Builder::new()
		.name(format!("rebuild-{community}"))
		.spawn(move || run_rebuild(state, community, cancel));
	if let Err(e) = spawned {
		data.jobs.finish(community);
		return HttpResponse::InternalServerError().body(format!("Cannot start rebuild: {e}"));
	}

	HttpResponse::Accepted().body("Ok, I'll get started. This may take a while")
}

/// HTTP DELETE endpoint `/v1/communities/{community}/rebuild`
///
/// Cancels a running corpus pass (owner only).
#[delete("/v1/communities/{community}/rebuild")]
async fn delete_rebuild(data: web::Data<AppState>, path: web::Path<u64>, req: HttpRequest) -> impl Responder {
	if !from_owner(&data, &req) {
		return HttpResponse::Forbidden().body("Only the bot owner may cancel a rebuild");
	}

	if data.jobs.cancel(CommunityId(path.into_inner())) {
		HttpResponse::Ok().body("Rebuild cancelled")
	} else {
		HttpResponse::NotFound().body("No rebuild running")
	}
}

fn open_history(config: &HistoryConfig) -> Result<Box<dyn MessageSource>, Box<dyn Error>> {
	match config {
		HistoryConfig::File { dir } => Ok(Box::new(FileHistorySource::from_dir(dir)?)),
		HistoryConfig::Rest { api_base, token, timeout_secs } => {
			let token = match token {
				Some(token) => token.clone(),
				None => std::env::var("BOT_TOKEN").map_err(|_| "no REST token configured and BOT_TOKEN is not set")?,
			};
			Ok(Box::new(RestHistorySource::new(api_base, &token, Duration::from_secs(*timeout_secs))?))
		}
	}
}

fn rebuild(state: &AppState, community: CommunityId, cancel: CancelFlag) -> Result<usize, Box<dyn Error>> {
	let source = open_history(&state.config.history)?;
	let build = CorpusBuilder::new(&*source, state.config.build_options())
		.with_cancel(cancel)
		.build_from_history(community)?;

	let _store = state.store_lock.lock().map_err(|_| "store lock poisoned")?;
	build.save(state.generator.store(), community)?;
	Ok(build.authors.len())
}

/// Body of a rebuild thread. Runs outside the async runtime.
fn run_rebuild(state: web::Data<AppState>, community: CommunityId, cancel: CancelFlag) {
	let started = Instant::now();
	match rebuild(&state, community, cancel) {
		Ok(authors) => log::info!(
			"Rebuilt {authors} author models for community {community} in {:.1}s",
			started.elapsed().as_secs_f64()
		),
		Err(e) => log::error!("Rebuild of community {community} failed: {e}"),
	}
	state.jobs.finish(community);
}

fn routes(cfg: &mut web::ServiceConfig) {
	cfg.service(get_message)
		.service(get_authors)
		.service(get_mimic)
		.service(post_message)
		.service(put_rebuild)
		.service(delete_rebuild);
}

/// Main entry point for the server.
///
/// Loads the configuration, builds the shared state and starts an
/// Actix-web HTTP server.
#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
	env_logger::init();

	let args = Args::parse();
	let config = Config::load(&args)?;
	let address = (config.bind.clone(), config.port);

	let state = web::Data::new(AppState::new(config));
	log::info!("Serving models from {}", state.generator.store().base().display());

	HttpServer::new(move || {
		App::new()
			.wrap(Cors::permissive())
			.app_data(state.clone())
			.configure(routes)
	})
		.bind(address)?
		.run()
		.await?;

	Ok(())
}
