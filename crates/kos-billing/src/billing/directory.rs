use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::domain::{Amount, Room, RoomId, RoomStatus, Tenant, TenantId};
use super::memory::InMemoryTenantDirectory;
use super::store::StoreError;

#[derive(Debug)]
pub enum DirectoryImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: u64, reason: String },
    Store(StoreError),
}

impl std::fmt::Display for DirectoryImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryImportError::Io(err) => write!(f, "failed to read tenant directory: {}", err),
            DirectoryImportError::Csv(err) => write!(f, "invalid tenant directory CSV: {}", err),
            DirectoryImportError::InvalidRow { line, reason } => {
                write!(f, "tenant directory row {}: {}", line, reason)
            }
            DirectoryImportError::Store(err) => {
                write!(f, "could not store imported directory: {}", err)
            }
        }
    }
}

impl std::error::Error for DirectoryImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DirectoryImportError::Io(err) => Some(err),
            DirectoryImportError::Csv(err) => Some(err),
            DirectoryImportError::InvalidRow { .. } => None,
            DirectoryImportError::Store(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for DirectoryImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for DirectoryImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<StoreError> for DirectoryImportError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Loads `tenant_id,name,phone,room_id,room_name,price` rows into an in-memory directory.
///
/// Every room referenced by a row is marked occupied. Rows sharing a room id must agree
/// on the room's name and price.
pub struct DirectoryImporter;

impl DirectoryImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<InMemoryTenantDirectory, DirectoryImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<InMemoryTenantDirectory, DirectoryImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let directory = InMemoryTenantDirectory::default();
        let mut rooms: HashMap<RoomId, Room> = HashMap::new();
        let mut tenants: HashMap<TenantId, u64> = HashMap::new();

        for record in csv_reader.deserialize::<DirectoryRow>() {
            let row = record?;
            let line = tenants.len() as u64 + 2;

            if row.name.is_empty() {
                return Err(DirectoryImportError::InvalidRow {
                    line,
                    reason: "tenant name is empty".to_string(),
                });
            }
            if row.price <= 0 {
                return Err(DirectoryImportError::InvalidRow {
                    line,
                    reason: format!("room price {} must be positive", row.price),
                });
            }
            if let Some(previous) = tenants.insert(TenantId(row.tenant_id), line) {
                return Err(DirectoryImportError::InvalidRow {
                    line,
                    reason: format!("tenant {} already listed on row {}", row.tenant_id, previous),
                });
            }

            let room = Room {
                id: RoomId(row.room_id),
                name: row.room_name.clone(),
                price: row.price,
                status: RoomStatus::Occupied,
            };
            if let Some(existing) = rooms.get(&room.id) {
                if existing != &room {
                    return Err(DirectoryImportError::InvalidRow {
                        line,
                        reason: format!("room {} is listed with conflicting details", row.room_id),
                    });
                }
            } else {
                rooms.insert(room.id, room);
            }

            directory.upsert_tenant(Tenant {
                id: TenantId(row.tenant_id),
                name: row.name,
                phone: row.phone,
                room_id: RoomId(row.room_id),
            })?;
        }

        for room in rooms.into_values() {
            directory.upsert_room(room)?;
        }

        Ok(directory)
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryRow {
    tenant_id: u64,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    phone: Option<String>,
    room_id: u64,
    room_name: String,
    price: Amount,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|raw| !raw.trim().is_empty()))
}
