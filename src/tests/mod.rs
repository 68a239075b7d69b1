mod support;

mod lifecycle;
