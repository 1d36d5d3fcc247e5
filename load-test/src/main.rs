use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::thread_rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target URL (e.g., http://localhost:8000)
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Number of voters (one token each) to simulate
    #[arg(short, long, default_value_t = 100)]
    voters: usize,

    /// Number of concurrent voters
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,

    /// Admin password for token issuance
    #[arg(short, long, default_value = "password")]
    password: String,
}

#[derive(Deserialize, Debug, Clone)]
struct Candidate {
    id: String,
    votes: u64,
}

#[derive(Deserialize, Debug)]
struct TokenData {
    id: String,
}

#[derive(Deserialize, Debug)]
struct ActionResponse {
    success: bool,
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct AdminLoginRequest<'a> {
    password: &'a str,
}

#[derive(Serialize)]
struct CreateTokensRequest {
    amount: u32,
}

#[derive(Serialize)]
struct ValidateTokenRequest<'a> {
    token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CastVoteRequest<'a> {
    token: &'a str,
    candidate_id: &'a str,
}

async fn run_voter(base_url: &str, token: &str, candidate_id: &str) -> Result<bool> {
    let client = Client::builder()
        .cookie_store(true)
        .build()
        .context("building voter client")?;

    let response = client
        .post(format!("{base_url}/api/session"))
        .send()
        .await
        .context("opening session")?;
    if !response.status().is_success() {
        bail!("session request failed: {}", response.status());
    }

    // Advisory pre-check, the same call the ballot UI makes.
    client
        .post(format!("{base_url}/api/tokens/validate"))
        .json(&ValidateTokenRequest { token })
        .send()
        .await
        .context("validating token")?;

    let outcome: ActionResponse = client
        .post(format!("{base_url}/api/votes"))
        .json(&CastVoteRequest { token, candidate_id })
        .send()
        .await
        .context("casting vote")?
        .json()
        .await
        .context("decoding vote outcome")?;

    if !outcome.success {
        eprintln!(
            "vote rejected ({}): {}",
            outcome.code.as_deref().unwrap_or("?"),
            outcome.message
        );
    }
    Ok(outcome.success)
}

async fn fetch_candidates(client: &Client, base_url: &str) -> Result<Vec<Candidate>> {
    client
        .get(format!("{base_url}/api/candidates"))
        .send()
        .await
        .context("fetching candidates")?
        .json()
        .await
        .context("decoding candidates")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let admin = Client::builder()
        .cookie_store(true)
        .build()
        .context("building admin client")?;

    let response = admin
        .post(format!("{}/api/admin/login", args.url))
        .json(&AdminLoginRequest {
            password: &args.password,
        })
        .send()
        .await
        .context("admin login")?;
    if !response.status().is_success() {
        bail!("admin login failed: {}", response.status());
    }

    let mut candidates = fetch_candidates(&admin, &args.url).await?;
    if candidates.is_empty() {
        for (name, no_urut) in [("Load Candidate A", 1), ("Load Candidate B", 2)] {
            admin
                .post(format!("{}/api/candidates", args.url))
                .json(&serde_json::json!({
                    "name": name,
                    "noUrut": no_urut,
                    "vision": "load test",
                    "mission": "load test",
                    "photoUrl": "https://picsum.photos/200",
                }))
                .send()
                .await
                .context("creating candidate")?
                .error_for_status()
                .context("candidate creation rejected")?;
        }
        candidates = fetch_candidates(&admin, &args.url).await?;
    }
    let baseline: u64 = candidates.iter().map(|c| c.votes).sum();

    // Batches are capped server-side at 1000 tokens each.
    let mut tokens: Vec<String> = Vec::with_capacity(args.voters);
    let mut remaining = args.voters;
    while remaining > 0 {
        let amount = remaining.min(1000) as u32;
        let batch: Vec<TokenData> = admin
            .post(format!("{}/api/tokens/batch", args.url))
            .json(&CreateTokensRequest { amount })
            .send()
            .await
            .context("issuing tokens")?
            .json()
            .await
            .context("decoding token batch")?;
        tokens.extend(batch.into_iter().map(|t| t.id));
        remaining -= amount as usize;
    }

    // Random collisions may repeat a code; only distinct tokens can win.
    let distinct: HashSet<&String> = tokens.iter().collect();
    println!(
        "Issued {} tokens ({} distinct), voting with concurrency {}...",
        tokens.len(),
        distinct.len(),
        args.concurrency
    );

    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let progress = ProgressBar::new(tokens.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        )
        .context("progress template")?
        .progress_chars("##-"),
    );

    let started = Instant::now();
    stream::iter(tokens.iter())
        .map(|token| {
            let candidate = candidates
                .choose(&mut thread_rng())
                .expect("candidates are non-empty")
                .clone();
            let url = args.url.clone();
            let successes = Arc::clone(&successes);
            let failures = Arc::clone(&failures);
            let progress = progress.clone();
            async move {
                match run_voter(&url, token, &candidate.id).await {
                    Ok(true) => successes.fetch_add(1, Ordering::Relaxed),
                    Ok(false) => failures.fetch_add(1, Ordering::Relaxed),
                    Err(e) => {
                        eprintln!("voter error: {e:#}");
                        failures.fetch_add(1, Ordering::Relaxed)
                    }
                };
                progress.inc(1);
            }
        })
        .buffer_unordered(args.concurrency)
        .collect::<Vec<()>>()
        .await;
    progress.finish_with_message("done");

    let ok = successes.load(Ordering::Relaxed);
    let failed = failures.load(Ordering::Relaxed);
    let elapsed = started.elapsed();
    println!(
        "{ok} votes accepted, {failed} rejected in {:.2}s ({:.1} votes/s)",
        elapsed.as_secs_f64(),
        ok as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    // Every accepted vote must appear in the tally, with no lost updates.
    let final_candidates = fetch_candidates(&admin, &args.url).await?;
    let total: u64 = final_candidates.iter().map(|c| c.votes).sum();
    if total - baseline != ok as u64 {
        bail!(
            "tally mismatch: {} accepted votes but tallies grew by {}",
            ok,
            total - baseline
        );
    }
    if ok != distinct.len() {
        bail!(
            "expected {} successful redemptions (one per distinct token), got {ok}",
            distinct.len()
        );
    }
    println!("Tally verified: counters grew by exactly {ok}.");

    Ok(())
}
