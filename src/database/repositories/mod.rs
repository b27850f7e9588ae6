pub mod draw;
pub mod submission;

pub use draw::DrawRepository;
pub use submission::SubmissionRepository;

use super::Database;
use rusqlite::Connection;

pub trait Repository {
    fn database(&self) -> &Database;

    fn connection(&self) -> &Connection {
        self.database().connection()
    }
}
