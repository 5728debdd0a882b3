use crate::common::{ConversationKey, Listing, Message, Profile};

/// Row of the `users` table
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub created_at: i64,
}

impl From<UserRow> for Profile {
    fn from(row: UserRow) -> Self {
        Profile {
            id: row.id,
            display_name: row.username,
            avatar_reference: row.avatar_url,
            phone: row.phone,
            bio: row.bio,
        }
    }
}

/// Row of the `books` table
#[derive(Debug, Clone)]
pub struct BookRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub author: String,
    pub price: f64,
    pub category: String,
    pub condition: String,
    pub description: Option<String>,
    pub contact_number: String,
    pub image_url: Option<String>,
    pub created_at: i64,
}

impl From<BookRow> for Listing {
    fn from(row: BookRow) -> Self {
        Listing {
            id: row.id,
            owner_id: row.user_id,
            title: row.title,
            author: row.author,
            price: row.price,
            category: row.category,
            condition: row.condition,
            description: row.description,
            contact_number: row.contact_number,
            image_url: row.image_url,
            created_at: row.created_at,
        }
    }
}

/// Row of the `messages` table. `seq` is the insert order used by live feeds.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub book_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: i64,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_key: ConversationKey::new(row.book_id),
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}
