use crate::flags::DatabaseFlags;

/// A handle to an individual database in an environment.
///
/// A database handle denotes the name and parameters of a database in an
/// environment. Handles are environment-scoped and shared by every
/// transaction through the environment's handle cache, so the same name
/// always resolves to the same native `dbi`.
///
/// The handle is `Copy`; its validity is checked on every use. A handle
/// whose database was dropped is reported as
/// [`LmdbError::StaleDatabase`](crate::LmdbError::StaleDatabase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Database {
    dbi: ffi::MDB_dbi,
    flags: DatabaseFlags,
    generation: u64,
    env_id: u64,
}

impl Database {
    /// Generation shared by every handle to the unnamed database.
    pub(crate) const MAIN_GENERATION: u64 = 0;

    pub(crate) const fn new(
        dbi: ffi::MDB_dbi,
        flags: DatabaseFlags,
        generation: u64,
        env_id: u64,
    ) -> Self {
        Self { dbi, flags, generation, env_id }
    }

    /// The native database handle.
    pub const fn dbi(&self) -> ffi::MDB_dbi {
        self.dbi
    }

    /// The persistent flags of the database.
    pub const fn flags(&self) -> DatabaseFlags {
        self.flags
    }

    /// Returns `true` for the unnamed database.
    pub const fn is_main(&self) -> bool {
        self.generation == Self::MAIN_GENERATION
    }

    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) const fn env_id(&self) -> u64 {
        self.env_id
    }
}
