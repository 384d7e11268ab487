use std::sync::Arc;

use mimic_core::alternate::NoAlternate;
use mimic_core::corpus::{BuildOptions, CorpusBuilder};
use mimic_core::history::FileHistorySource;
use mimic_core::ids::{AuthorId, CommunityId};
use mimic_core::model::generator::MessageGenerator;
use mimic_core::store::ModelStore;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Community to read, first argument (defaults to the sample dump "1")
    let community: CommunityId = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => CommunityId(1),
    };

    // Load every "<community id>.json" history dump from "data/history"
    let source = FileHistorySource::from_dir("./data/history")?;

    // Messages containing the redaction marker are skipped (spoilers)
    // Page size is how many messages are read at once from a channel
    // Parallelism is how many channels are read at the same time
    let options = BuildOptions {
        redaction_marker: "||".to_owned(),
        page_size: 2,
        parallelism: 2,
    };

    // Read the whole history: one global model and one model per author
    let build = CorpusBuilder::new(&source, options).build_from_history(community)?;
    for (author, corpus) in &build.authors {
        println!("{author}: {} messages, {} words", corpus.messages.len(), corpus.model.len() - 2);
    }

    // Save everything under "data/markov/<community>/"
    let store = ModelStore::new("./data/markov");
    build.save(&store, community)?;

    // The global model mixes everybody
    for i in 0..3 {
        println!("Global message {}: {}", i + 1, build.global.generate()?);
    }

    // Pick a random author each time, like the bot does at runtime
    let generator = MessageGenerator::new(store, Arc::new(NoAlternate));
    for i in 0..5 {
        match generator.message_for_community(community)? {
            Some((author, message)) if !message.trim().is_empty() => {
                println!("Generated message {} by {}: {}", i + 1, author, message)
            }
            _ => println!("Generated message {}: nothing to say", i + 1),
        }
    }

    // Mimic one specific author
    let author = AuthorId(2);
    match generator.mimic(community, author)? {
        Some(message) => println!("{author} would say: {message}"),
        None => println!("No model found for user {author}"),
    }

    Ok(())
}
