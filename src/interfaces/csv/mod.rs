pub mod locker_writer;
