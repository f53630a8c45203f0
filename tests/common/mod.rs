#![allow(dead_code)]

use faculty_finder::embedding::{EmbeddingError, EmbeddingProvider};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DIMENSION: usize = 64;

/// Deterministic bag-of-words embedding: each word adds 1.0 to a hashed axis
pub struct HashingProvider {
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
}

impl HashingProvider {
    pub fn new() -> Self {
        Self {
            batch_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
        }
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[fnv1a(&word.to_lowercase()) as usize % DIMENSION] += 1.0;
        }
        v
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

impl EmbeddingProvider for HashingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        Ok(Self::vector(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at batch position {}",
                pos
            )));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "hashing-test"
    }
}

pub const SCHEMA: &str = "
    CREATE TABLE faculty (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        department TEXT,
        bio TEXT,
        research_interests TEXT,
        education TEXT,
        bio_text_clean TEXT,
        profile_url TEXT UNIQUE,
        image_url TEXT
    );
";

/// (name, research interests, embedding text)
pub const FACULTY: &[(&str, &str, &str)] = &[
    (
        "Anil Kumar",
        "Wireless communication",
        "Anil Kumar. wireless communication and signal processing for mobile networks",
    ),
    (
        "Bela Shah",
        "Machine learning",
        "Bela Shah. machine learning with deep neural networks for vision",
    ),
    (
        "Chitra Rao",
        "Renewable energy",
        "Chitra Rao. renewable energy with solar power and sustainable energy systems",
    ),
];

/// Create a faculty database with the three indexable rows above
pub fn create_database(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    for (name, research, clean) in FACULTY {
        insert_faculty(&conn, name, research, clean);
    }
    conn
}

/// Create a faculty database whose rows all lack embedding text
pub fn create_unindexable_database(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    insert_faculty(&conn, "Dev Patel", "Algebra", "");
    conn
}

pub fn insert_faculty(conn: &Connection, name: &str, research: &str, clean: &str) -> i64 {
    conn.execute(
        "INSERT INTO faculty (name, department, research_interests, bio_text_clean, profile_url)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            name,
            "DA-IICT",
            research,
            clean,
            format!("https://faculty.example.edu/{}", name.replace(' ', "-"))
        ],
    )
    .unwrap();
    conn.last_insert_rowid()
}
