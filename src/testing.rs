// 该文件是 Huishou （回收分类） 项目的一部分。
// src/testing.rs - 单元测试共用的本地 HTTP 服务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  io::{BufRead, BufReader, Write},
  net::TcpListener,
  thread,
};

use reqwest::blocking::Client;
use url::Url;

/// 只响应一次请求的本地 HTTP 服务
pub(crate) fn serve_once(status_line: &'static str, body: Vec<u8>) -> Url {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  let addr = listener.local_addr().unwrap();
  thread::spawn(move || {
    let (stream, _) = listener.accept().unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
      line.clear();
    }
    let mut stream = reader.into_inner();
    // 客户端可能在读完状态行后就断开
    let _ = write!(
      stream,
      "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
      body.len()
    );
    let _ = stream.write_all(&body);
  });
  Url::parse(&format!("http://{addr}/artifact")).unwrap()
}

/// 不读取代理环境变量的客户端
pub(crate) fn local_client() -> Client {
  Client::builder().no_proxy().build().unwrap()
}
