use rusqlite::{Connection, OptionalExtension, Result as SqlResult, Row, params, params_from_iter};
use std::path::Path;
use std::time::Duration;

use super::models::{BookRow, MessageRow, UserRow};

const USER_COLUMNS: &str = "id, username, avatar_url, phone, bio, created_at";
const BOOK_COLUMNS: &str = "id, user_id, title, author, price, category, condition, description, contact_number, image_url, created_at";
const MESSAGE_COLUMNS: &str = "seq, id, book_id, sender_id, receiver_id, content, created_at";

/// Marketplace database (users, books, messages)
pub struct MarketDatabase {
    conn: Connection,
}

impl MarketDatabase {
    /// Open the database at a custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        // other processes poll and write the same file
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Throwaway database, used by tests and demos
    pub fn in_memory() -> SqlResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SqlResult<Self> {
        let market_db = Self { conn };
        market_db.init_schema()?;
        Ok(market_db)
    }

    fn init_schema(&self) -> SqlResult<()> {
        let conn = &self.conn;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                avatar_url TEXT,
                phone TEXT,
                bio TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        // files created before profile editing lack these
        add_missing_column(conn, "users", "phone", "TEXT")?;
        add_missing_column(conn, "users", "bio", "TEXT")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                price REAL NOT NULL,
                category TEXT NOT NULL,
                condition TEXT NOT NULL,
                description TEXT,
                contact_number TEXT NOT NULL,
                image_url TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        // seq gives live feeds a monotonic cursor independent of clock skew
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                book_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_book_created ON messages(book_id, created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_books_user ON books(user_id)",
            [],
        )?;

        Ok(())
    }

    // ========== Users ==========

    pub fn insert_user(&self, user: &UserRow) -> SqlResult<()> {
        let conn = &self.conn;
        conn.execute(
            "INSERT INTO users (id, username, avatar_url, phone, bio, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.username,
                user.avatar_url,
                user.phone,
                user.bio,
                user.created_at
            ],
        )?;
        Ok(())
    }

    /// Overwrite the editable fields of `user`. Returns false if no such id.
    pub fn update_user(&self, user: &UserRow) -> SqlResult<bool> {
        let conn = &self.conn;
        let changed = conn.execute(
            "UPDATE users SET username = ?2, phone = ?3, bio = ?4 WHERE id = ?1",
            params![user.id, user.username, user.phone, user.bio],
        )?;
        Ok(changed > 0)
    }

    pub fn find_user(&self, id: &str) -> SqlResult<Option<UserRow>> {
        let conn = &self.conn;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
    }

    pub fn find_user_by_name(&self, username: &str) -> SqlResult<Option<UserRow>> {
        let conn = &self.conn;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()
    }

    /// Users whose id is in `ids`. Unknown ids are simply absent.
    pub fn users_in(&self, ids: &[String]) -> SqlResult<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = &self.conn;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params_from_iter(ids.iter()), user_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(users)
    }

    // ========== Books ==========

    pub fn insert_book(&self, book: &BookRow) -> SqlResult<()> {
        let conn = &self.conn;
        conn.execute(
            &format!(
                "INSERT INTO books ({BOOK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                book.id,
                book.user_id,
                book.title,
                book.author,
                book.price,
                book.category,
                book.condition,
                book.description,
                book.contact_number,
                book.image_url,
                book.created_at
            ],
        )?;
        Ok(())
    }

    pub fn find_book(&self, id: &str) -> SqlResult<Option<BookRow>> {
        let conn = &self.conn;
        conn.query_row(
            &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
            params![id],
            book_from_row,
        )
        .optional()
    }

    /// All books, newest first
    pub fn all_books(&self) -> SqlResult<Vec<BookRow>> {
        let conn = &self.conn;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at DESC"
        ))?;
        let books = stmt
            .query_map([], book_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(books)
    }

    pub fn books_by_owner(&self, user_id: &str) -> SqlResult<Vec<BookRow>> {
        let conn = &self.conn;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;
        let books = stmt
            .query_map(params![user_id], book_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(books)
    }

    // ========== Messages ==========

    /// Insert a message and return its sequence number
    pub fn insert_message(&self, message: &MessageRow) -> SqlResult<i64> {
        let conn = &self.conn;
        conn.execute(
            "INSERT INTO messages (id, book_id, sender_id, receiver_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.book_id,
                message.sender_id,
                message.receiver_id,
                message.content,
                message.created_at
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Messages of one book, oldest first
    pub fn messages_for_book(&self, book_id: &str) -> SqlResult<Vec<MessageRow>> {
        let conn = &self.conn;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE book_id = ?1
             ORDER BY created_at ASC, seq ASC"
        ))?;
        let messages = stmt
            .query_map(params![book_id], message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(messages)
    }

    /// Messages of one book inserted after `seq`, in insert order
    pub fn messages_after(&self, book_id: &str, seq: i64) -> SqlResult<Vec<MessageRow>> {
        let conn = &self.conn;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE book_id = ?1 AND seq > ?2
             ORDER BY seq ASC"
        ))?;
        let messages = stmt
            .query_map(params![book_id, seq], message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(messages)
    }

    /// Highest message sequence number, 0 for an empty table
    pub fn max_message_seq(&self) -> SqlResult<i64> {
        let conn = &self.conn;
        conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM messages", [], |row| {
            row.get(0)
        })
    }
}

fn add_missing_column(conn: &Connection, table: &str, column: &str, decl: &str) -> SqlResult<()> {
    let present = {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<SqlResult<Vec<_>>>()?;
        names.iter().any(|name| name == column)
    };
    if !present {
        log::info!("Adding column {table}.{column}");
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
    }
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> SqlResult<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        avatar_url: row.get(2)?,
        phone: row.get(3)?,
        bio: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn book_from_row(row: &Row<'_>) -> SqlResult<BookRow> {
    Ok(BookRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        price: row.get(4)?,
        category: row.get(5)?,
        condition: row.get(6)?,
        description: row.get(7)?,
        contact_number: row.get(8)?,
        image_url: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn message_from_row(row: &Row<'_>) -> SqlResult<MessageRow> {
    Ok(MessageRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        book_id: row.get(2)?,
        sender_id: row.get(3)?,
        receiver_id: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> UserRow {
        UserRow {
            id: id.to_string(),
            username: name.to_string(),
            avatar_url: None,
            phone: None,
            bio: None,
            created_at: 1,
        }
    }

    fn message(id: &str, book: &str, created_at: i64) -> MessageRow {
        MessageRow {
            seq: 0,
            id: id.to_string(),
            book_id: book.to_string(),
            sender_id: "a".to_string(),
            receiver_id: "b".to_string(),
            content: format!("msg {id}"),
            created_at,
        }
    }

    #[test]
    fn users_in_skips_unknown_ids() {
        let db = MarketDatabase::in_memory().unwrap();
        db.insert_user(&user("a", "alice")).unwrap();
        db.insert_user(&user("b", "bob")).unwrap();

        let ids = vec!["a".to_string(), "zzz".to_string()];
        let found = db.users_in(&ids).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "alice");
        assert!(db.users_in(&[]).unwrap().is_empty());
    }

    #[test]
    fn usernames_are_unique() {
        let db = MarketDatabase::in_memory().unwrap();
        db.insert_user(&user("a", "alice")).unwrap();
        assert!(db.insert_user(&user("b", "alice")).is_err());
        assert_eq!(db.find_user_by_name("alice").unwrap().unwrap().id, "a");
    }

    #[test]
    fn update_user_overwrites_editable_fields() {
        let db = MarketDatabase::in_memory().unwrap();
        db.insert_user(&user("a", "alice")).unwrap();

        let mut edited = user("a", "alice.w");
        edited.phone = Some("5550001111".to_string());
        edited.bio = Some("Collects first editions".to_string());
        assert!(db.update_user(&edited).unwrap());
        assert!(!db.update_user(&user("zzz", "nobody")).unwrap());

        let stored = db.find_user("a").unwrap().unwrap();
        assert_eq!(stored.username, "alice.w");
        assert_eq!(stored.phone.as_deref(), Some("5550001111"));
        assert_eq!(stored.bio.as_deref(), Some("Collects first editions"));
        assert_eq!(stored.created_at, 1);
    }

    #[test]
    fn older_users_table_gains_profile_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                avatar_url TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO users (id, username, avatar_url, created_at) VALUES ('a', 'alice', NULL, 1)",
            [],
        )
        .unwrap();

        let db = MarketDatabase::from_connection(conn).unwrap();
        let stored = db.find_user("a").unwrap().unwrap();
        assert_eq!(stored.username, "alice");
        assert_eq!(stored.phone, None);
        assert_eq!(stored.bio, None);
    }

    #[test]
    fn messages_are_ordered_by_creation_then_insert() {
        let db = MarketDatabase::in_memory().unwrap();
        db.insert_message(&message("late", "book", 300)).unwrap();
        db.insert_message(&message("tie-1", "book", 100)).unwrap();
        db.insert_message(&message("tie-2", "book", 100)).unwrap();
        db.insert_message(&message("other", "other-book", 50)).unwrap();

        let ids: Vec<_> = db
            .messages_for_book("book")
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["tie-1", "tie-2", "late"]);
    }

    #[test]
    fn messages_after_uses_sequence_cursor() {
        let db = MarketDatabase::in_memory().unwrap();
        assert_eq!(db.max_message_seq().unwrap(), 0);
        let first = db.insert_message(&message("m1", "book", 100)).unwrap();
        db.insert_message(&message("m2", "book", 50)).unwrap();

        let after: Vec<_> = db
            .messages_after("book", first)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(after, vec!["m2"]);
        assert_eq!(db.max_message_seq().unwrap(), 2);
    }
}
