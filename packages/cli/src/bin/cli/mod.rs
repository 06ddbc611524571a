pub mod documents;
pub mod workspaces;
