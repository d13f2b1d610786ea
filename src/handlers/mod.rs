//! HTTP handlers: conversion intake, artifact downloads, health probes.

pub mod convert_handlers;
pub mod download_handlers;
pub mod health_handlers;
