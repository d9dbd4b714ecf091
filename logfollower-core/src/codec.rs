use logfollower_model::{CollectionRef, Event, EventKind, RemoteTxId, Tick};
use serde_json::Value;
use thiserror::Error;

/// Errors `decode` can raise.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed marker: {0}")]
    Malformed(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("tick regressed: got {got}, already saw {last} in this chunk stream")]
    TickRegressed { got: Tick, last: Tick },
}

fn kind_from_wire(raw: &str) -> EventKind {
    match raw {
        "begin" => EventKind::BeginTx,
        "commit" => EventKind::CommitTx,
        "abort" => EventKind::AbortTx,
        "insert" => EventKind::InsertDoc,
        "update" => EventKind::UpdateDoc,
        "remove" => EventKind::RemoveDoc,
        "createCollection" => EventKind::CreateCollection,
        "dropCollection" => EventKind::DropCollection,
        "renameCollection" => EventKind::RenameCollection,
        "changeCollection" => EventKind::ChangeCollection,
        // Unknown kinds decode as `Other` and are ignored downstream —
        // forward compatibility with masters that emit newer kinds.
        _ => EventKind::Other,
    }
}

fn collection_ref(raw: &Value) -> Option<CollectionRef> {
    let name = raw.get("cname").and_then(Value::as_str).map(str::to_owned);
    let id = raw.get("cid").and_then(Value::as_u64);
    if name.is_none() && id.is_none() {
        None
    } else {
        Some(CollectionRef { name, id })
    }
}

/// Decode one self-describing structured record into a typed [`Event`].
///
/// `last_tick_in_stream` is the largest tick already returned from the
/// same chunk stream (`None` at the start of a chunk); it enforces
/// strictly ascending ticks within that stream.
pub fn decode(raw: &Value, last_tick_in_stream: Option<Tick>) -> Result<Event, DecodeError> {
    let tick = raw
        .get("tick")
        .and_then(Value::as_u64)
        .ok_or(DecodeError::MissingField("tick"))?;
    if tick == 0 {
        return Err(DecodeError::Malformed("tick must be nonzero".to_owned()));
    }
    let tick = Tick(tick);
    if let Some(last) = last_tick_in_stream {
        if tick <= last {
            return Err(DecodeError::TickRegressed { got: tick, last });
        }
    }

    let kind_str = raw
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("type"))?;
    let kind = kind_from_wire(kind_str);

    let tx_id = raw.get("tid").and_then(Value::as_u64).map(RemoteTxId);
    if kind.is_tx_fence() && tx_id.is_none() {
        return Err(DecodeError::MissingField("tid"));
    }

    let collection = collection_ref(raw);
    if (kind.is_doc_op() || kind.is_ddl()) && collection.is_none() {
        return Err(DecodeError::MissingField("cname"));
    }

    let payload = raw.get("data").cloned().unwrap_or(Value::Null);
    if (kind.is_doc_op() || kind.is_ddl()) && payload.is_null() {
        return Err(DecodeError::MissingField("data"));
    }

    Ok(Event {
        tick,
        kind,
        tx_id,
        collection,
        payload,
    })
}
