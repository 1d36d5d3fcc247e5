//! In-process document store for the election.
//!
//! Two collections (`tokens` keyed by the token string, `candidates`
//! keyed by a generated id) live behind a single `RwLock`. A vote runs
//! entirely under the write lock: every failure check happens before
//! any mutation, so an aborted attempt leaves both records untouched
//! and concurrent attempts on the same token are linearized by the
//! lock. After each mutation the full ordered snapshot is re-published
//! on a watch channel, which is the read-only live feed consumed by
//! dashboards. The feed has no write authority and the vote path never
//! reads from it.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use rand::{thread_rng, Rng};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::ElectionError;
use crate::models::{Candidate, NewCandidate, TokenData};

/// Symbols allowed in voting tokens. Visually ambiguous characters
/// (`I`, `1`, `O`, `0`) are excluded so printed tokens survive hand
/// entry.
pub const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const TOKEN_LEN: usize = 6;

#[derive(Debug, Clone)]
struct TokenRecord {
    is_used: bool,
    generated_at: i64,
    used_at: Option<i64>,
}

#[derive(Debug, Clone)]
struct CandidateRecord {
    name: String,
    no_urut: i64,
    vision: String,
    mission: String,
    photo_url: String,
    votes: u64,
}

#[derive(Default)]
struct Collections {
    tokens: HashMap<String, TokenRecord>,
    candidates: HashMap<String, CandidateRecord>,
}

pub struct ElectionStore {
    collections: RwLock<Collections>,
    /// Opaque anonymous identities gating write access. An identity
    /// carries no credentials and does not identify the voter.
    identities: RwLock<HashSet<String>>,
    candidates_tx: watch::Sender<Vec<Candidate>>,
    tokens_tx: watch::Sender<Vec<TokenData>>,
}

/// Canonical form for voter-entered tokens.
pub fn normalize_token(raw: &str) -> String {
    raw.trim().to_uppercase()
}

fn generate_token_code<R: Rng>(rng: &mut R) -> String {
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

fn token_data(id: &str, record: &TokenRecord) -> TokenData {
    TokenData {
        id: id.to_string(),
        is_used: record.is_used,
        generated_at: record.generated_at,
        used_at: record.used_at,
    }
}

fn candidate_data(id: &str, record: &CandidateRecord) -> Candidate {
    Candidate {
        id: id.to_string(),
        name: record.name.clone(),
        no_urut: record.no_urut,
        vision: record.vision.clone(),
        mission: record.mission.clone(),
        photo_url: record.photo_url.clone(),
        votes: record.votes,
    }
}

fn ordered_candidates(collections: &Collections) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = collections
        .candidates
        .iter()
        .map(|(id, record)| candidate_data(id, record))
        .collect();
    out.sort_by(|a, b| a.no_urut.cmp(&b.no_urut).then_with(|| a.id.cmp(&b.id)));
    out
}

fn ordered_tokens(collections: &Collections) -> Vec<TokenData> {
    let mut out: Vec<TokenData> = collections
        .tokens
        .iter()
        .map(|(id, record)| token_data(id, record))
        .collect();
    out.sort_by(|a, b| b.generated_at.cmp(&a.generated_at).then_with(|| a.id.cmp(&b.id)));
    out
}

impl ElectionStore {
    pub fn new() -> Self {
        let (candidates_tx, _) = watch::channel(Vec::new());
        let (tokens_tx, _) = watch::channel(Vec::new());
        Self {
            collections: RwLock::new(Collections::default()),
            identities: RwLock::new(HashSet::new()),
            candidates_tx,
            tokens_tx,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, ElectionError> {
        self.collections
            .read()
            .map_err(|_| ElectionError::ConnectivityFailure)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, ElectionError> {
        self.collections
            .write()
            .map_err(|_| ElectionError::ConnectivityFailure)
    }

    /// Mints and registers an anonymous session identity.
    pub fn issue_identity(&self) -> Result<String, ElectionError> {
        let mut identities = self
            .identities
            .write()
            .map_err(|_| ElectionError::AuthUnavailable)?;
        let identity = Uuid::new_v4().to_string();
        identities.insert(identity.clone());
        Ok(identity)
    }

    fn has_identity(&self, identity: &str) -> Result<bool, ElectionError> {
        Ok(self
            .identities
            .read()
            .map_err(|_| ElectionError::AuthUnavailable)?
            .contains(identity))
    }

    /// Generates `amount` independent tokens and persists them. No
    /// uniqueness check beyond the 32^6 random space; a colliding code
    /// keeps the existing record, since a consumed token must never
    /// revert to unused.
    pub fn create_tokens(&self, amount: u32) -> Result<Vec<TokenData>, ElectionError> {
        let mut collections = self.write()?;
        let mut rng = thread_rng();
        let now = Utc::now().timestamp_millis();

        let mut created = Vec::with_capacity(amount as usize);
        for _ in 0..amount {
            let code = generate_token_code(&mut rng);
            let record = collections
                .tokens
                .entry(code.clone())
                .or_insert(TokenRecord {
                    is_used: false,
                    generated_at: now,
                    used_at: None,
                });
            created.push(token_data(&code, record));
        }

        self.publish_tokens(&collections);
        Ok(created)
    }

    /// Advisory pre-check. Side-effect free: the token is not reserved,
    /// and a concurrent redemption may still win the race before the
    /// caller's vote transaction runs.
    pub fn validate_token(&self, raw: &str) -> Result<(), ElectionError> {
        let collections = self.read()?;
        match collections.tokens.get(&normalize_token(raw)) {
            None => Err(ElectionError::TokenNotFound),
            Some(record) if record.is_used => Err(ElectionError::TokenAlreadyUsed),
            Some(_) => Ok(()),
        }
    }

    pub fn add_candidate(&self, new: NewCandidate) -> Result<Candidate, ElectionError> {
        let mut collections = self.write()?;
        let id = Uuid::new_v4().to_string();
        let record = CandidateRecord {
            name: new.name,
            no_urut: new.no_urut,
            vision: new.vision,
            mission: new.mission,
            photo_url: new.photo_url,
            votes: 0,
        };
        let candidate = candidate_data(&id, &record);
        collections.candidates.insert(id, record);
        self.publish_candidates(&collections);
        Ok(candidate)
    }

    /// Removes a candidate. Votes already counted for it are gone with
    /// the record; consumed tokens stay consumed.
    pub fn delete_candidate(&self, id: &str) -> Result<(), ElectionError> {
        let mut collections = self.write()?;
        if collections.candidates.remove(id).is_none() {
            return Err(ElectionError::CandidateNotFound);
        }
        self.publish_candidates(&collections);
        Ok(())
    }

    /// The voting transaction: verify the session identity, verify the
    /// token and candidate, then consume the token and increment the
    /// tally as one unit under the write lock. Exactly one of two
    /// attempts racing on the same token succeeds; the loser observes
    /// the consumed token and fails with `TokenAlreadyUsed`.
    pub fn cast_vote(
        &self,
        identity: Option<&str>,
        raw_token: &str,
        candidate_id: &str,
    ) -> Result<(), ElectionError> {
        match identity {
            Some(identity) if self.has_identity(identity)? => {}
            _ => return Err(ElectionError::PermissionDenied),
        }

        let mut collections = self.write()?;
        let token = normalize_token(raw_token);

        let Collections { tokens, candidates } = &mut *collections;
        let token_record = tokens.get_mut(&token).ok_or(ElectionError::TokenNotFound)?;
        if token_record.is_used {
            return Err(ElectionError::TokenAlreadyUsed);
        }
        let candidate = candidates
            .get_mut(candidate_id)
            .ok_or(ElectionError::CandidateNotFound)?;

        // Commit point: both writes land under the same lock guard.
        token_record.is_used = true;
        token_record.used_at = Some(Utc::now().timestamp_millis());
        candidate.votes += 1;

        self.publish_tokens(&collections);
        self.publish_candidates(&collections);
        Ok(())
    }

    /// Current candidates, ordered by `no_urut` ascending.
    pub fn candidates_snapshot(&self) -> Result<Vec<Candidate>, ElectionError> {
        Ok(ordered_candidates(&*self.read()?))
    }

    /// Current tokens, ordered by `generated_at` descending.
    pub fn tokens_snapshot(&self) -> Result<Vec<TokenData>, ElectionError> {
        Ok(ordered_tokens(&*self.read()?))
    }

    pub fn subscribe_candidates(&self) -> watch::Receiver<Vec<Candidate>> {
        self.candidates_tx.subscribe()
    }

    pub fn subscribe_tokens(&self) -> watch::Receiver<Vec<TokenData>> {
        self.tokens_tx.subscribe()
    }

    fn publish_candidates(&self, collections: &Collections) {
        let _ = self.candidates_tx.send(ordered_candidates(collections));
    }

    fn publish_tokens(&self, collections: &Collections) {
        let _ = self.tokens_tx.send(ordered_tokens(collections));
    }

    /// Seeds a token with a known code.
    #[cfg(test)]
    pub(crate) fn insert_token(&self, code: &str) {
        let mut collections = self.collections.write().unwrap();
        collections.tokens.insert(
            code.to_string(),
            TokenRecord {
                is_used: false,
                generated_at: Utc::now().timestamp_millis(),
                used_at: None,
            },
        );
        self.publish_tokens(&collections);
    }
}

impl Default for ElectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn candidate(name: &str, no_urut: i64) -> NewCandidate {
        NewCandidate {
            name: name.to_string(),
            no_urut,
            vision: "vision".to_string(),
            mission: "mission".to_string(),
            photo_url: "https://example.com/p.jpg".to_string(),
        }
    }

    fn store_with_identity() -> (ElectionStore, String) {
        let store = ElectionStore::new();
        let identity = store.issue_identity().unwrap();
        (store, identity)
    }

    #[test]
    fn generated_tokens_use_the_fixed_alphabet() {
        let store = ElectionStore::new();
        let tokens = store.create_tokens(100).unwrap();
        assert_eq!(tokens.len(), 100);
        for token in &tokens {
            assert_eq!(token.id.len(), TOKEN_LEN);
            assert!(token.id.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
            assert!(!token.is_used);
            assert!(token.used_at.is_none());
        }
    }

    #[test]
    fn validation_normalizes_case_and_whitespace() {
        let store = ElectionStore::new();
        store.insert_token("AB3X9K");
        assert!(store.validate_token(" ab3x9k ").is_ok());
        assert_eq!(
            store.validate_token("ZZZZZZ"),
            Err(ElectionError::TokenNotFound)
        );
    }

    #[test]
    fn validation_does_not_reserve_the_token() {
        let (store, identity) = store_with_identity();
        store.insert_token("AB3X9K");
        let c1 = store.add_candidate(candidate("Alpha", 1)).unwrap();

        assert!(store.validate_token("AB3X9K").is_ok());
        assert!(store.validate_token("AB3X9K").is_ok());
        store.cast_vote(Some(&identity), "AB3X9K", &c1.id).unwrap();
        assert_eq!(
            store.validate_token("AB3X9K"),
            Err(ElectionError::TokenAlreadyUsed)
        );
    }

    #[test]
    fn vote_requires_a_registered_identity() {
        let store = ElectionStore::new();
        store.insert_token("AB3X9K");
        let c1 = store.add_candidate(candidate("Alpha", 1)).unwrap();

        assert_eq!(
            store.cast_vote(None, "AB3X9K", &c1.id),
            Err(ElectionError::PermissionDenied)
        );
        assert_eq!(
            store.cast_vote(Some("not-issued"), "AB3X9K", &c1.id),
            Err(ElectionError::PermissionDenied)
        );
        // Nothing was consumed by the rejected attempts.
        assert!(store.validate_token("AB3X9K").is_ok());
    }

    #[test]
    fn redeeming_a_token_twice_fails_and_counts_once() {
        let (store, identity) = store_with_identity();
        store.insert_token("AB3X9K");
        let c1 = store.add_candidate(candidate("Alpha", 1)).unwrap();
        let c2 = store.add_candidate(candidate("Beta", 2)).unwrap();

        store.cast_vote(Some(&identity), "AB3X9K", &c1.id).unwrap();
        assert_eq!(
            store.cast_vote(Some(&identity), "AB3X9K", &c2.id),
            Err(ElectionError::TokenAlreadyUsed)
        );

        let snapshot = store.candidates_snapshot().unwrap();
        assert_eq!(snapshot[0].votes, 1);
        assert_eq!(snapshot[1].votes, 0);

        let token = &store.tokens_snapshot().unwrap()[0];
        assert!(token.is_used);
        assert!(token.used_at.is_some());
    }

    #[test]
    fn missing_candidate_leaves_the_token_unused() {
        let (store, identity) = store_with_identity();
        store.insert_token("77QRST");

        assert_eq!(
            store.cast_vote(Some(&identity), "77QRST", "no-such-candidate"),
            Err(ElectionError::CandidateNotFound)
        );
        assert!(store.validate_token("77QRST").is_ok());
    }

    #[test]
    fn deleting_a_candidate_spares_other_tallies() {
        let (store, identity) = store_with_identity();
        store.insert_token("AB3X9K");
        store.insert_token("PL2M4N");
        let c1 = store.add_candidate(candidate("Alpha", 1)).unwrap();
        let c2 = store.add_candidate(candidate("Beta", 2)).unwrap();

        store.cast_vote(Some(&identity), "AB3X9K", &c1.id).unwrap();
        store.delete_candidate(&c2.id).unwrap();
        assert_eq!(
            store.delete_candidate(&c2.id),
            Err(ElectionError::CandidateNotFound)
        );

        // Votes on surviving candidates still work and keep their tally.
        store.cast_vote(Some(&identity), "PL2M4N", &c1.id).unwrap();
        let snapshot = store.candidates_snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].votes, 2);
    }

    #[test]
    fn concurrent_redemptions_of_one_token_yield_one_success() {
        let (store, identity) = store_with_identity();
        let store = Arc::new(store);
        store.insert_token("AB3X9K");
        let c1 = store.add_candidate(candidate("Alpha", 1)).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let identity = identity.clone();
                let candidate_id = c1.id.clone();
                thread::spawn(move || store.cast_vote(Some(&identity), "AB3X9K", &candidate_id))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let already_used = results
            .iter()
            .filter(|r| **r == Err(ElectionError::TokenAlreadyUsed))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(already_used, 15);
        assert_eq!(store.candidates_snapshot().unwrap()[0].votes, 1);
    }

    #[test]
    fn concurrent_disjoint_tokens_lose_no_updates() {
        let (store, identity) = store_with_identity();
        let store = Arc::new(store);
        let c1 = store.add_candidate(candidate("Alpha", 1)).unwrap();

        let codes: Vec<String> = store
            .create_tokens(32)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();

        let handles: Vec<_> = codes
            .iter()
            .map(|code| {
                let store = Arc::clone(&store);
                let identity = identity.clone();
                let candidate_id = c1.id.clone();
                let code = code.clone();
                thread::spawn(move || store.cast_vote(Some(&identity), &code, &candidate_id))
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(
            store.candidates_snapshot().unwrap()[0].votes,
            successes as u64
        );
        assert_eq!(successes, codes.iter().collect::<HashSet<_>>().len());
    }

    #[test]
    fn snapshots_are_ordered() {
        let (store, identity) = store_with_identity();
        store.add_candidate(candidate("Third", 3)).unwrap();
        let first = store.add_candidate(candidate("First", 1)).unwrap();
        store.add_candidate(candidate("Second", 2)).unwrap();

        let names: Vec<_> = store
            .candidates_snapshot()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["First", "Second", "Third"]);

        store.insert_token("AB3X9K");
        store.cast_vote(Some(&identity), "AB3X9K", &first.id).unwrap();
        let tokens = store.tokens_snapshot().unwrap();
        assert!(tokens.windows(2).all(|w| w[0].generated_at >= w[1].generated_at));
    }

    #[test]
    fn feed_converges_after_mutations() {
        let (store, identity) = store_with_identity();
        let candidates_rx = store.subscribe_candidates();
        let tokens_rx = store.subscribe_tokens();

        let c1 = store.add_candidate(candidate("Alpha", 1)).unwrap();
        store.insert_token("AB3X9K");
        store.cast_vote(Some(&identity), "AB3X9K", &c1.id).unwrap();

        let candidates = candidates_rx.borrow().clone();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].votes, 1);

        let tokens = tokens_rx.borrow().clone();
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_used);
    }
}
