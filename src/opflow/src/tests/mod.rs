mod mocks;

mod gate;
mod submission;
