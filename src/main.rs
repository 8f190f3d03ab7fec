use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::info;
use std::path::PathBuf;

use bedrock_demos::apps::analysis::{Analysis, AnalysisApp, AnalysisKind};
use bedrock_demos::apps::faces::{FaceComparison, FaceComparisonApp, FaceDescriptionApp};
use bedrock_demos::apps::image_search::{ImageHit, ImageSearchApp, DEFAULT_IMAGE_DIR};
use bedrock_demos::apps::knowledge_base::{KnowledgeBaseApp, SearchOutcome, DEFAULT_KNOWLEDGE_BASE};
use bedrock_demos::apps::sentiment::SentimentApp;
use bedrock_demos::apps::{read_input, report, DEFAULT_TOP_K};
use bedrock_demos::config::AppConfig;
use bedrock_demos::embeddings::{
    BedrockEmbedder, TITAN_MULTIMODAL_EMBEDDINGS, TITAN_TEXT_EMBEDDINGS,
};
use bedrock_demos::faces::{RekognitionClient, DEFAULT_SIMILARITY_THRESHOLD};
use bedrock_demos::generation::{
    BedrockGenerator, ModelFamily, CLAUDE_3_SONNET, JURASSIC_ULTRA, TITAN_TEXT_PREMIER,
};

/// Generative AI demos on hosted foundation models: text analysis, semantic
/// search and face analysis
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze the sentiment of customer reviews
    Sentiment {
        /// Analyze this review and exit instead of prompting
        #[arg(long)]
        input: Option<String>,
        #[arg(long, default_value = JURASSIC_ULTRA)]
        model: String,
        /// Request layout of the model, when it cannot be told from the id
        #[arg(long)]
        family: Option<ModelFamily>,
    },
    /// Analyze log entries with similar entries from a log corpus as context
    Logs {
        /// JSON corpus [default: logs.json]
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Field holding the text to index [default: log]
        #[arg(long)]
        content_key: Option<String>,
        #[arg(long)]
        input: Option<String>,
        #[arg(long, default_value = JURASSIC_ULTRA)]
        model: String,
        /// Request layout of the model, when it cannot be told from the id
        #[arg(long)]
        family: Option<ModelFamily>,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Summarize invoices with similar invoices from a corpus as context
    Invoices {
        /// JSON corpus [default: invoices.json]
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Field holding the text to index [default: invoice_id]
        #[arg(long)]
        content_key: Option<String>,
        #[arg(long)]
        input: Option<String>,
        #[arg(long, default_value = JURASSIC_ULTRA)]
        model: String,
        /// Request layout of the model, when it cannot be told from the id
        #[arg(long)]
        family: Option<ModelFamily>,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Search a CSV knowledge base
    KnowledgeBase {
        #[arg(long, default_value = DEFAULT_KNOWLEDGE_BASE)]
        corpus: PathBuf,
        #[arg(long)]
        input: Option<String>,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Also print the leading values of the question embedding
        #[arg(long)]
        show_embedding: bool,
    },
    /// Find images by description or by example
    ImageSearch {
        #[arg(long, default_value = DEFAULT_IMAGE_DIR)]
        dir: PathBuf,
        /// Search term; combined with --image when both are given
        #[arg(long)]
        text: Option<String>,
        /// Example image to search with
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Face comparison and description
    Faces {
        #[command(subcommand)]
        command: FacesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum FacesCommand {
    /// Compare the faces of two images and summarize the result
    Compare {
        source: PathBuf,
        target: PathBuf,
        #[arg(long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
        threshold: f32,
        /// Skip the written summary
        #[arg(long)]
        no_summary: bool,
        #[arg(long, default_value = TITAN_TEXT_PREMIER)]
        summary_model: String,
        /// Request layout of the summary model
        #[arg(long)]
        summary_family: Option<ModelFamily>,
    },
    /// Describe the faces in an image
    Describe {
        image: PathBuf,
        /// Instructions for the answer, e.g. a JSON layout to follow
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long, default_value = CLAUDE_3_SONNET)]
        model: String,
        /// Request layout of the model, when it cannot be told from the id
        #[arg(long)]
        family: Option<ModelFamily>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Invalid service configuration")?;
    info!(
        "Using region {} with a {:?} timeout",
        config.bedrock.region, config.bedrock.timeout
    );

    match cli.command {
        Command::Sentiment {
            input,
            model,
            family,
        } => {
            let app = SentimentApp::new(generator(&config, &model, family)?);
            match input {
                Some(review) => report(app.analyze(&review).await, print_text),
                None => {
                    println!("Enter a customer review to analyze. Type 'exit' to quit.");
                    while let Some(review) = read_input("Review")? {
                        report(app.analyze(&review).await, print_text);
                    }
                }
            }
        }
        Command::Logs {
            corpus,
            content_key,
            input,
            model,
            family,
            top_k,
        } => {
            run_analysis(
                &config,
                AnalysisKind::Logs,
                corpus,
                content_key,
                generator(&config, &model, family)?,
                top_k,
                input,
            )
            .await?
        }
        Command::Invoices {
            corpus,
            content_key,
            input,
            model,
            family,
            top_k,
        } => {
            run_analysis(
                &config,
                AnalysisKind::Invoices,
                corpus,
                content_key,
                generator(&config, &model, family)?,
                top_k,
                input,
            )
            .await?
        }
        Command::KnowledgeBase {
            corpus,
            input,
            top_k,
            show_embedding,
        } => {
            let embedder = BedrockEmbedder::new(config.bedrock.clone(), TITAN_TEXT_EMBEDDINGS)
                .context("Failed to initialize embedding client")?;
            let mut app = KnowledgeBaseApp::new(embedder, &corpus).with_top_k(top_k);

            println!("Indexing {}...", corpus.display());
            app.prepare()
                .await
                .with_context(|| format!("Failed to index {}", corpus.display()))?;

            let render = |outcome: SearchOutcome| print_search(outcome, show_embedding);
            match input {
                Some(question) => report(app.search(&question).await, render),
                None => {
                    println!("Ask a question about the company. Type 'exit' to quit.");
                    while let Some(question) = read_input("Your question")? {
                        report(app.search(&question).await, render);
                    }
                }
            }
        }
        Command::ImageSearch {
            dir,
            text,
            image,
            top_k,
        } => {
            let embedder = BedrockEmbedder::new(config.bedrock.clone(), TITAN_MULTIMODAL_EMBEDDINGS)
                .context("Failed to initialize embedding client")?;
            let mut app = ImageSearchApp::new(embedder, &dir).with_top_k(top_k);

            println!("Indexing images in {}...", dir.display());
            let count = app
                .prepare()
                .await
                .with_context(|| format!("Failed to index images in {}", dir.display()))?;
            println!("Indexed {} images.", count);

            if text.is_some() || image.is_some() {
                report(
                    app.search(text.as_deref(), image.as_deref()).await,
                    print_hits,
                );
            } else {
                println!("Describe the image you are looking for. Type 'exit' to quit.");
                while let Some(term) = read_input("Search term")? {
                    report(app.search(Some(&term), None).await, print_hits);
                }
            }
        }
        Command::Faces { command } => run_faces(&config, command).await?,
    }

    Ok(())
}

fn generator(
    config: &AppConfig,
    model: &str,
    family: Option<ModelFamily>,
) -> Result<BedrockGenerator> {
    let family = family
        .or_else(|| ModelFamily::from_model_id(model))
        .ok_or_else(|| anyhow!("Cannot tell the request layout of {}; pass --family", model))?;
    let generator = BedrockGenerator::new(config.bedrock.clone(), model, family)
        .context("Failed to initialize generation client")?;
    info!(
        "Generating with {} ({})",
        generator.model_id(),
        generator.family()
    );
    Ok(generator)
}

async fn run_analysis(
    config: &AppConfig,
    kind: AnalysisKind,
    corpus: Option<PathBuf>,
    content_key: Option<String>,
    generator: BedrockGenerator,
    top_k: usize,
    input: Option<String>,
) -> Result<()> {
    let corpus = corpus.unwrap_or_else(|| PathBuf::from(kind.default_corpus()));
    let content_key = content_key.unwrap_or_else(|| kind.default_content_key().to_string());
    let embedder = BedrockEmbedder::new(config.bedrock.clone(), TITAN_TEXT_EMBEDDINGS)
        .context("Failed to initialize embedding client")?;
    let mut app = AnalysisApp::new(kind, embedder, generator)
        .with_corpus(&corpus, content_key)
        .with_top_k(top_k);

    println!("Indexing {}...", corpus.display());
    app.prepare()
        .await
        .with_context(|| format!("Failed to index {}", corpus.display()))?;

    match input {
        Some(entry) => report(app.analyze(&entry).await, print_analysis),
        None => {
            println!("Enter a {} to analyze. Type 'exit' to quit.", app.kind().label());
            while let Some(entry) = read_input("Entry")? {
                report(app.analyze(&entry).await, print_analysis);
            }
        }
    }
    Ok(())
}

async fn run_faces(config: &AppConfig, command: FacesCommand) -> Result<()> {
    match command {
        FacesCommand::Compare {
            source,
            target,
            threshold,
            no_summary,
            summary_model,
            summary_family,
        } => {
            let rekognition = RekognitionClient::new(config.rekognition.clone())
                .context("Failed to initialize face analysis client")?;
            let mut app = FaceComparisonApp::new(rekognition);
            if !no_summary {
                app = app.with_summarizer(generator(config, &summary_model, summary_family)?);
            }
            report(
                app.compare(&source, &target, threshold).await,
                print_comparison,
            );
        }
        FacesCommand::Describe {
            image,
            instructions,
            model,
            family,
        } => {
            let app = FaceDescriptionApp::new(generator(config, &model, family)?);
            report(
                app.describe(&image, instructions.as_deref()).await,
                print_text,
            );
        }
    }
    Ok(())
}

fn print_text(text: String) {
    println!("\n{}", text.trim());
}

fn print_analysis(analysis: Analysis) {
    if !analysis.related.is_empty() {
        println!("\nRelated entries:");
        for entry in &analysis.related {
            println!("  [{:.4}] {}", entry.distance, entry.text.trim());
        }
    }
    print_text(analysis.text);
}

fn print_search(outcome: SearchOutcome, show_embedding: bool) {
    if show_embedding {
        let head: Vec<String> = outcome
            .query_embedding
            .values
            .iter()
            .take(8)
            .map(|v| format!("{:.4}", v))
            .collect();
        println!(
            "\nQuestion embedding ({} dimensions): [{}, ...]",
            outcome.query_embedding.dimension(),
            head.join(", ")
        );
    }

    println!("\n{:>8}  Content", "Score");
    for result in &outcome.results {
        println!("{:>8.4}  {}", result.score, result.content.replace('\n', " | "));
    }
}

fn print_hits(hits: Vec<ImageHit>) {
    println!();
    for hit in &hits {
        println!("{:>8.4}  {}", hit.distance, hit.path.display());
    }
}

fn print_comparison(comparison: FaceComparison) {
    println!(
        "\nFound {} faces in the source image.",
        comparison.source_faces.len()
    );
    for face in &comparison.source_faces {
        println!("Face (Confidence: {:.2})", face.confidence);
        if let Some(gender) = &face.gender {
            println!(" - Gender: {} (Confidence: {:.2})", gender.value, gender.confidence);
        }
        if let Some(age) = &face.age_range {
            println!(" - Age Range: {} - {}", age.low, age.high);
        }
        if !face.emotions.is_empty() {
            let emotions: Vec<&str> = face.emotions.iter().map(|e| e.kind.as_str()).collect();
            println!(" - Emotions: {}", emotions.join(", "));
        }
    }

    println!("\nFound {} matching faces.", comparison.matches.len());
    for face in &comparison.matches {
        let b = &face.bounding_box;
        println!(
            "Face (Similarity: {:.2}) at left {:.2}, top {:.2}, {:.2} x {:.2}",
            face.similarity, b.left, b.top, b.width, b.height
        );
    }

    if let Some(summary) = comparison.summary {
        println!("\nSummary:");
        print_text(summary);
    }
}
