mod common;
mod info_requests;
mod lifecycle;
mod notifications;
mod offers;
