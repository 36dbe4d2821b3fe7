pub mod retention_cleaner;
pub mod timeline_player;
pub mod workspace_evictor;
