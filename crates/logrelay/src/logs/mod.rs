//! Log files on disk: the editor logs the Terminal watches and the dated
//! files the Application keeps

pub mod dated;
pub mod watched;
