mod local;
mod services;
mod sessions;
