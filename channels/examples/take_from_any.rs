// examples/take_from_any.rs
use fibre_balance::{take_from_any, CancelToken, Channel, TakeResult};
use std::{thread, time::Duration};

fn main() {
  println!("--- Blocking producer/consumer ---");
  {
    let channel = Channel::new();
    let consumer = {
      let channel = channel.clone();
      thread::spawn(move || {
        while let TakeResult::Value(msg) = channel.take_blocking() {
          println!("[Blocking consumer] Took: {}", msg);
        }
        println!("[Blocking consumer] Channel ended.");
      })
    };
    for i in 0..3 {
      channel.add(format!("Message-{}", i));
    }
    println!("{}", channel);
    channel.complete_adding();
    consumer.join().unwrap();
  }

  println!("\n--- take_from_any over three channels ---");
  let rt = tokio::runtime::Runtime::new().unwrap();
  rt.block_on(async {
    let channels = [Channel::new(), Channel::new(), Channel::new()];
    let token = CancelToken::new();

    let producer = {
      let second = channels[1].clone();
      tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        println!("[Producer] Adding to channel 1");
        second.add("from channel 1");
      })
    };

    match take_from_any(&channels, &token) {
      Ok(any) => match any.await {
        Ok(won) => println!("[Selector] Channel {} won with {:?}", won.index, won.value),
        Err(e) => println!("[Selector] {}", e),
      },
      Err(e) => println!("[Selector] Rejected: {}", e),
    }
    producer.await.unwrap();

    println!("\n--- Cancelling a pending take_from_any ---");
    let token = CancelToken::new();
    let any = take_from_any(&channels, &token).unwrap();
    token.cancel();
    println!("[Selector] Outcome: {:?}", any.await);

    channels[0].add("kept");
    println!("[Main] Channel 0 after cancellation: {}", channels[0]);
  });
}
