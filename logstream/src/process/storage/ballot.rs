use super::*;

mod value {
    use super::*;

    #[derive(Deserialize, Serialize)]
    struct OnDiskStruct {
        term: Term,
        voted_for: Option<Endpoint>,
    }

    pub fn ser(x: Ballot) -> Result<Vec<u8>> {
        let x = OnDiskStruct {
            term: x.cur_term,
            voted_for: x.voted_for,
        };
        Ok(bincode::serialize(&x)?)
    }

    pub fn desr(bin: &[u8]) -> Result<Ballot> {
        let x: OnDiskStruct = bincode::deserialize(bin)?;
        Ok(Ballot {
            cur_term: x.term,
            voted_for: x.voted_for,
        })
    }
}

fn table_def(space: &str) -> TableDefinition<'_, (), Vec<u8>> {
    TableDefinition::new(space)
}

/// Persists the ballot and the last committed configuration of a partition.
pub struct BallotStore {
    db: Arc<Database>,
    ballot_space: String,
    configuration_space: String,
}

impl BallotStore {
    pub fn new(db: Arc<Database>, partition_id: PartitionId) -> Result<Self> {
        let ballot_space = format!("ballot.{partition_id}");
        let configuration_space = format!("configuration.{partition_id}");

        // Insert the initial value if not exists.
        let tx = db.begin_write().map_err(storage_error)?;
        {
            let mut tbl = tx
                .open_table(table_def(&ballot_space))
                .map_err(storage_error)?;
            if tbl.get(()).map_err(storage_error)?.is_none() {
                tbl.insert((), value::ser(Ballot::new())?)
                    .map_err(storage_error)?;
            }
            let _ = tx
                .open_table(table_def(&configuration_space))
                .map_err(storage_error)?;
        }
        tx.commit().map_err(storage_error)?;

        Ok(Self {
            db,
            ballot_space,
            configuration_space,
        })
    }

    fn put(&self, space: &str, bin: Vec<u8>) -> Result<()> {
        let tx = self.db.begin_write().map_err(storage_error)?;
        {
            let mut tbl = tx.open_table(table_def(space)).map_err(storage_error)?;
            tbl.insert((), bin).map_err(storage_error)?;
        }
        tx.commit().map_err(storage_error)?;
        Ok(())
    }

    fn get(&self, space: &str) -> Result<Option<Vec<u8>>> {
        let tx = self.db.begin_read().map_err(storage_error)?;
        let tbl = tx.open_table(table_def(space)).map_err(storage_error)?;
        let bin = tbl.get(()).map_err(storage_error)?.map(|v| v.value());
        Ok(bin)
    }

    pub async fn save_ballot(&self, ballot: Ballot) -> Result<()> {
        self.put(&self.ballot_space, value::ser(ballot)?)
    }

    pub async fn load_ballot(&self) -> Result<Ballot> {
        let bin = self
            .get(&self.ballot_space)?
            .ok_or_else(|| Error::Storage("no ballot".to_owned()))?;
        value::desr(&bin)
    }

    pub async fn save_configuration(&self, config: &Configuration) -> Result<()> {
        self.put(&self.configuration_space, bincode::serialize(config)?)
    }

    pub async fn load_configuration(&self) -> Result<Option<Configuration>> {
        match self.get(&self.configuration_space)? {
            Some(bin) => Ok(Some(bincode::deserialize(&bin)?)),
            None => Ok(None),
        }
    }
}
