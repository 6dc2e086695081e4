pub mod test_manager;
