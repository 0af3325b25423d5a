/*!
Shared fixtures: an application schema covering every catalog entity, seeded
with a small but fully linked data set.
*/

#![allow(dead_code)]

use relsnap_core::{AesGcmEncrypter, EncryptionKey, SqliteStore};

pub const SCHEMA: &str = "
CREATE TABLE countries (id INTEGER PRIMARY KEY, name TEXT NOT NULL, code TEXT);
CREATE TABLE cities (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    country_id INTEGER NOT NULL REFERENCES countries(id)
);
CREATE TABLE neighborhoods (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    city_id INTEGER NOT NULL REFERENCES cities(id)
);
CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    password TEXT NOT NULL,
    remember_token TEXT
);
CREATE TABLE companies (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    city_id INTEGER REFERENCES cities(id)
);
CREATE TABLE articles (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    city_id INTEGER REFERENCES cities(id),
    user_id INTEGER REFERENCES users(id),
    published_at TEXT
);
CREATE TABLE deals (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    price REAL,
    company_id INTEGER REFERENCES companies(id),
    city_id INTEGER REFERENCES cities(id)
);
CREATE TABLE jobs (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    remote INTEGER NOT NULL DEFAULT 0,
    company_id INTEGER REFERENCES companies(id),
    category_id INTEGER REFERENCES categories(id),
    city_id INTEGER REFERENCES cities(id)
);
CREATE TABLE article_tag (
    article_id INTEGER NOT NULL REFERENCES articles(id),
    tag_id INTEGER NOT NULL REFERENCES tags(id)
);
CREATE TABLE favorites (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    job_id INTEGER NOT NULL REFERENCES jobs(id)
);
CREATE TABLE job_user_interactions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    action TEXT NOT NULL
);
CREATE TABLE newsletter_subscribers (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
CREATE TABLE settings (id INTEGER PRIMARY KEY, key TEXT NOT NULL, value TEXT);
CREATE TABLE security_logs (
    id INTEGER PRIMARY KEY,
    user_id INTEGER REFERENCES users(id),
    event TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE banned_ips (id INTEGER PRIMARY KEY, ip TEXT NOT NULL);
CREATE TABLE cache (key TEXT PRIMARY KEY, value TEXT, expiration INTEGER);
CREATE TABLE sessions (id TEXT PRIMARY KEY, user_id INTEGER, payload TEXT);
CREATE TABLE password_reset_tokens (email TEXT PRIMARY KEY, token TEXT, created_at TEXT);
";

pub const SEED: &str = "
INSERT INTO countries VALUES (1, 'Portugal', 'PT'), (2, 'Spain', 'ES');
INSERT INTO cities VALUES (1, 'Lisbon', 1), (2, 'Porto', 1), (3, 'Madrid', 2);
INSERT INTO neighborhoods VALUES (1, 'Alfama', 1), (2, 'Ribeira', 2);
INSERT INTO categories VALUES (1, 'Engineering'), (2, 'Design');
INSERT INTO tags VALUES (1, 'rust'), (2, 'remote');
INSERT INTO users VALUES
    (1, 'Ana', 'ana@example.com', 'secret123', 'remember-ana'),
    (2, 'Rui', 'rui@example.com', '', NULL);
INSERT INTO companies VALUES (1, 'Acme', 1), (2, 'Globex', 3);
INSERT INTO articles VALUES
    (1, 'Moving to Lisbon', 1, 1, '2024-01-05 10:00:00'),
    (2, 'Porto nights', 2, 2, '2024-01-03 09:00:00');
INSERT INTO deals VALUES (1, 'Coffee, two for one', 3.5, 1, 1);
INSERT INTO jobs VALUES
    (1, 'Backend engineer', 1, 1, 1, 1),
    (2, 'Product designer', 0, 2, 2, 3);
INSERT INTO article_tag VALUES (1, 1), (1, 2), (2, 2);
INSERT INTO favorites VALUES (1, 1, 1), (2, 2, 2);
INSERT INTO job_user_interactions VALUES (1, 1, 1, 'viewed'), (2, 1, 2, 'applied');
INSERT INTO newsletter_subscribers VALUES (1, 'news@example.com');
INSERT INTO settings VALUES (1, 'site_name', 'Example \"quoted\"');
INSERT INTO security_logs VALUES (1, 1, 'login', '2024-01-05 10:01:00');
INSERT INTO banned_ips VALUES (1, '203.0.113.7');
INSERT INTO cache VALUES ('homepage', 'cached html', 1700000000);
INSERT INTO sessions VALUES ('sess-1', 1, 'payload');
INSERT INTO password_reset_tokens VALUES ('rui@example.com', 'reset-token', '2024-01-05 10:02:00');
";

/// Rows per entity in [`SEED`]
pub const SEED_COUNTS: &[(&str, u64)] = &[
    ("countries", 2),
    ("cities", 3),
    ("neighborhoods", 2),
    ("categories", 2),
    ("tags", 2),
    ("users", 2),
    ("companies", 2),
    ("articles", 2),
    ("deals", 1),
    ("jobs", 2),
    ("article_tag", 3),
    ("favorites", 2),
    ("job_user_interactions", 2),
    ("newsletter_subscribers", 1),
    ("settings", 1),
    ("security_logs", 1),
    ("banned_ips", 1),
    ("cache", 1),
    ("sessions", 1),
    ("password_reset_tokens", 1),
];

/// Empty database with the full schema
pub fn empty_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.connection().execute_batch(SCHEMA).unwrap();
    store
}

/// Database with the full schema and the seed data
pub fn seeded_store() -> SqliteStore {
    let store = empty_store();
    store.connection().execute_batch(SEED).unwrap();
    store
}

pub fn encrypter() -> AesGcmEncrypter {
    AesGcmEncrypter::new(&EncryptionKey::parse("integration test key").unwrap())
}

pub fn seed_count(entity: &str) -> u64 {
    SEED_COUNTS
        .iter()
        .find(|(name, _)| *name == entity)
        .map(|(_, count)| *count)
        .unwrap_or(0)
}

/// Value of one column of one row, as text
pub fn cell(store: &SqliteStore, sql: &str) -> Option<String> {
    store
        .connection()
        .query_row(sql, [], |row| row.get::<_, Option<String>>(0))
        .unwrap()
}
