//! Storage of notes in the `notes` collection.
//!
//! Each function states what it needs through its participant bound:
//! readers take `&impl ReadParticipant`, writers `&impl WriteParticipant`.
//!
//! Titles are unique ignoring case. Every write that adds, changes or drops a
//! title also rewrites one index document, so two transactions claiming the
//! same title always collide on that key and the store's conflict detection
//! turns the race into a retry.

use std::collections::BTreeMap;

use crate::notes::error::{NoteError, NoteResult};
use crate::notes::model::{Note, NoteId};
use crate::store::{Collection, DocKey, DocumentRead, DocumentWrite, StoreSession};
use crate::transaction::{ReadParticipant, WriteParticipant};

/// Name of the collection holding notes.
pub const NOTES_COLLECTION: &str = "notes";

/// Collection holding the title index.
pub const NOTE_INDEX_COLLECTION: &str = "note_index";

const TITLE_INDEX_KEY: &str = "titles";

/// Lowercased title to note id.
type TitleIndex = BTreeMap<String, NoteId>;

fn collection() -> NoteResult<Collection> {
    Collection::new(NOTES_COLLECTION).map_err(|e| NoteError::Validation(e.to_string()))
}

fn index_location() -> NoteResult<(Collection, DocKey)> {
    let collection = Collection::new(NOTE_INDEX_COLLECTION)
        .map_err(|e| NoteError::Validation(e.to_string()))?;
    let key = DocKey::new(TITLE_INDEX_KEY).map_err(|e| NoteError::Validation(e.to_string()))?;
    Ok((collection, key))
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

async fn read_title_index<P>(tx: &P) -> NoteResult<TitleIndex>
where
    P: ReadParticipant<Session = StoreSession>,
{
    let (collection, key) = index_location()?;
    match tx.reader().get(&collection, &key).await? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(TitleIndex::new()),
    }
}

async fn write_title_index<P>(tx: &P, index: &TitleIndex) -> NoteResult<()>
where
    P: WriteParticipant<Session = StoreSession>,
{
    let (collection, key) = index_location()?;
    let value = serde_json::to_value(index)?;
    tx.writer().put(&collection, &key, value).await?;
    Ok(())
}

/// Fetch one note.
pub async fn get_note<P>(tx: &P, id: &NoteId) -> NoteResult<Option<Note>>
where
    P: ReadParticipant<Session = StoreSession>,
{
    let value = tx.reader().get(&collection()?, &id.doc_key()).await?;
    Ok(value.map(serde_json::from_value).transpose()?)
}

/// All notes, oldest first.
pub async fn list_notes<P>(tx: &P) -> NoteResult<Vec<Note>>
where
    P: ReadParticipant<Session = StoreSession>,
{
    let mut notes = tx
        .reader()
        .scan(&collection()?)
        .await?
        .into_iter()
        .map(|(_, value)| serde_json::from_value::<Note>(value))
        .collect::<Result<Vec<_>, _>>()?;
    notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(notes)
}

/// The note with exactly this title, ignoring case.
pub async fn find_by_title<P>(tx: &P, title: &str) -> NoteResult<Option<Note>>
where
    P: ReadParticipant<Session = StoreSession>,
{
    match read_title_index(tx).await?.get(&title_key(title)) {
        Some(id) => get_note(tx, id).await,
        None => Ok(None),
    }
}

/// Notes whose title or body contains `text`.
pub async fn search_notes<P>(tx: &P, text: &str) -> NoteResult<Vec<Note>>
where
    P: ReadParticipant<Session = StoreSession>,
{
    Ok(list_notes(tx)
        .await?
        .into_iter()
        .filter(|note| note.matches(text))
        .collect())
}

/// Write `note` and move its index entry from `previous` title, if any.
async fn store_note<P>(tx: &P, note: &Note, previous: Option<&str>) -> NoteResult<()>
where
    P: WriteParticipant<Session = StoreSession>,
{
    let wanted = title_key(&note.title);
    if previous.map(title_key).as_deref() != Some(wanted.as_str()) {
        let mut index = read_title_index(tx).await?;
        if let Some(owner) = index.get(&wanted) {
            if *owner != note.id {
                return Err(NoteError::Validation(format!(
                    "a note titled '{}' already exists",
                    note.title
                )));
            }
        }
        if let Some(old) = previous.map(title_key) {
            if index.get(&old) == Some(&note.id) {
                index.remove(&old);
            }
        }
        index.insert(wanted, note.id);
        write_title_index(tx, &index).await?;
    }

    let value = serde_json::to_value(note)?;
    tx.writer().put(&collection()?, &note.id.doc_key(), value).await?;
    Ok(())
}

/// Store a new note. Fails with `Validation` when the title is taken.
pub async fn insert_note<P>(tx: &P, note: &Note) -> NoteResult<()>
where
    P: WriteParticipant<Session = StoreSession>,
{
    store_note(tx, note, None).await
}

/// Replace an existing note. Fails with `Validation` when the new title is
/// taken by another note.
pub async fn update_note<P>(tx: &P, note: &Note) -> NoteResult<()>
where
    P: WriteParticipant<Session = StoreSession>,
{
    let current = get_note(tx, &note.id)
        .await?
        .ok_or(NoteError::NotFound(note.id))?;
    store_note(tx, note, Some(&current.title)).await
}

/// Remove a note and its index entry.
pub async fn delete_note<P>(tx: &P, id: &NoteId) -> NoteResult<()>
where
    P: WriteParticipant<Session = StoreSession>,
{
    let current = get_note(tx, id).await?.ok_or(NoteError::NotFound(*id))?;

    let mut index = read_title_index(tx).await?;
    let old = title_key(&current.title);
    if index.get(&old) == Some(id) {
        index.remove(&old);
        write_title_index(tx, &index).await?;
    }

    tx.writer().delete(&collection()?, &id.doc_key()).await?;
    Ok(())
}
