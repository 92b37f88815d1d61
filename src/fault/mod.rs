pub mod chaos;
