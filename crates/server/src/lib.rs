pub mod gateway;
pub mod pages;
